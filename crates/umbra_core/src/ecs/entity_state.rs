//! # Entity State Part
//!
//! Issues entity ids, recycles them, and tracks generations.
//!
//! ```text
//! Free ──create──► Alive ──destroy──► Free
//!  (even gen)      (odd gen)          (even gen)
//! ```
//!
//! Free ids are handed out lowest first. When none are left the backing
//! arrays grow by a fixed step; the owner of this part is responsible for
//! growing every dependent array to the new [`EntityStatePart::capacity`].

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::trace;

use super::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::memory::AllocatorId;

/// Callback run inside [`EntityStatePart::destroy_entity`], while the
/// entity is still alive.
pub type DestroyListener = Box<dyn FnMut(Entity)>;

/// Id allocation and liveness for one allocator.
pub struct EntityStatePart {
    /// Allocator stamped into every handle.
    allocator: AllocatorId,
    /// Generation per id.
    generations: Vec<u32>,
    /// Free ids, lowest on top.
    free: BinaryHeap<Reverse<u32>>,
    /// Number of live entities.
    alive: usize,
    /// Ids added per expansion.
    expand_step: u32,
    /// Destroy listeners, in registration order.
    listeners: Vec<DestroyListener>,
}

impl EntityStatePart {
    /// Creates an empty part. No ids exist until the first create.
    ///
    /// # Arguments
    ///
    /// * `allocator` - Allocator stamped into issued handles
    /// * `expand_step` - Ids added whenever the free pool runs dry
    #[must_use]
    pub fn new(allocator: AllocatorId, expand_step: u32) -> Self {
        Self {
            allocator,
            generations: Vec::new(),
            free: BinaryHeap::new(),
            alive: 0,
            expand_step: expand_step.max(1),
            listeners: Vec::new(),
        }
    }

    /// Issues a live entity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OutOfMemory`] if the id space is exhausted.
    pub fn create_entity(&mut self) -> CoreResult<Entity> {
        if self.free.is_empty() {
            self.expand()?;
        }
        let Some(Reverse(id)) = self.free.pop() else {
            return Err(CoreError::OutOfMemory {
                requested: 1,
                limit: self.generations.len(),
            });
        };
        let generation = &mut self.generations[id as usize];
        *generation = generation.wrapping_add(1);
        debug_assert!(Entity::is_alive_generation(*generation));
        self.alive += 1;
        Ok(Entity::new(id, *generation, self.allocator))
    }

    /// Destroys an entity, returning `false` if it was not alive.
    ///
    /// Listeners run first, while [`EntityStatePart::is_alive`] still holds.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        for listener in &mut self.listeners {
            listener(entity);
        }
        let generation = &mut self.generations[entity.index()];
        *generation = generation.wrapping_add(1);
        self.free.push(Reverse(entity.id));
        self.alive -= 1;
        trace!(entity = %entity, "entity destroyed");
        true
    }

    /// Returns `true` if `entity` is alive in this part.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        entity.allocator == self.allocator.raw()
            && Entity::is_alive_generation(entity.generation)
            && self.generations.get(entity.index()) == Some(&entity.generation)
    }

    /// Registers a destroy listener.
    pub fn add_destroy_listener(&mut self, listener: impl FnMut(Entity) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Number of ids backed by the arrays.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.generations.len() as u32
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.alive
    }

    /// Number of ids waiting in the free pool.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Current generation of an id.
    #[must_use]
    pub fn generation_of(&self, id: u32) -> Option<u32> {
        self.generations.get(id as usize).copied()
    }

    /// Returns the live handle currently using `id`.
    #[must_use]
    pub fn entity_at(&self, id: u32) -> Option<Entity> {
        self.generation_of(id)
            .filter(|&g| Entity::is_alive_generation(g))
            .map(|g| Entity::new(id, g, self.allocator))
    }

    fn expand(&mut self) -> CoreResult<()> {
        let old = self.capacity();
        let new = old
            .checked_add(self.expand_step)
            .ok_or(CoreError::OutOfMemory {
                requested: self.expand_step as usize,
                limit: u32::MAX as usize,
            })?;
        self.generations.resize(new as usize, 0);
        self.free.extend((old..new).map(Reverse));
        trace!(old, new, "entity arrays expanded");
        Ok(())
    }
}

impl std::fmt::Debug for EntityStatePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStatePart")
            .field("allocator", &self.allocator)
            .field("capacity", &self.capacity())
            .field("alive", &self.alive)
            .field("free", &self.free.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn part() -> EntityStatePart {
        EntityStatePart::new(AllocatorId(1), 4)
    }

    #[test]
    fn test_create_is_alive() {
        let mut part = part();
        let e = part.create_entity().unwrap();
        assert!(part.is_alive(e));
        assert_eq!(e.id, 0);
        assert_eq!(e.generation, 1);
        assert_eq!(part.alive_count(), 1);
    }

    #[test]
    fn test_destroy_makes_handle_stale() {
        let mut part = part();
        let e = part.create_entity().unwrap();
        assert!(part.destroy_entity(e));
        assert!(!part.is_alive(e));
        assert!(!part.destroy_entity(e));

        let reused = part.create_entity().unwrap();
        assert_eq!(reused.id, e.id);
        assert_ne!(reused.generation, e.generation);
        assert!(!part.is_alive(e));
        assert!(part.is_alive(reused));
    }

    #[test]
    fn test_lowest_free_id_first() {
        let mut part = part();
        let all: Vec<_> = (0..4).map(|_| part.create_entity().unwrap()).collect();
        part.destroy_entity(all[3]);
        part.destroy_entity(all[1]);
        assert_eq!(part.create_entity().unwrap().id, 1);
        assert_eq!(part.create_entity().unwrap().id, 3);
    }

    #[test]
    fn test_expands_by_step() {
        let mut part = part();
        assert_eq!(part.capacity(), 0);
        for _ in 0..5 {
            part.create_entity().unwrap();
        }
        assert_eq!(part.capacity(), 8);
        assert_eq!(part.free_count(), 3);
    }

    #[test]
    fn test_listener_sees_live_entity() {
        let mut part = part();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        part.add_destroy_listener(move |e| log.borrow_mut().push(e));

        let e = part.create_entity().unwrap();
        part.destroy_entity(e);
        part.destroy_entity(e);
        assert_eq!(*seen.borrow(), vec![e]);
    }

    #[test]
    fn test_listener_runs_before_generation_bump() {
        let mut part = part();
        let snapshot = Rc::new(Cell::new(None));
        let slot = snapshot.clone();
        part.add_destroy_listener(move |e: Entity| {
            slot.set(Some((e.generation, Entity::is_alive_generation(e.generation))));
        });

        let e = part.create_entity().unwrap();
        let live_generation = part.generation_of(e.id).unwrap();
        assert!(part.destroy_entity(e));

        // the listener saw the generation the part held while e was alive
        assert_eq!(snapshot.get(), Some((live_generation, true)));
        assert_eq!(part.generation_of(e.id), Some(live_generation + 1));
        assert!(!part.is_alive(e));

        let reused = part.create_entity().unwrap();
        assert_eq!(reused.id, e.id);
        assert!(part.destroy_entity(reused));
        assert_eq!(snapshot.get(), Some((live_generation + 2, true)));
    }

    #[test]
    fn test_foreign_and_null_handles_not_alive() {
        let mut part = part();
        let e = part.create_entity().unwrap();
        let foreign = Entity::new(e.id, e.generation, AllocatorId(2));
        assert!(!part.is_alive(foreign));
        assert!(!part.is_alive(Entity::NULL));
    }

    #[test]
    fn test_entity_at() {
        let mut part = part();
        let e = part.create_entity().unwrap();
        assert_eq!(part.entity_at(e.id), Some(e));
        part.destroy_entity(e);
        assert_eq!(part.entity_at(e.id), None);
        assert_eq!(part.entity_at(99), None);
    }
}
