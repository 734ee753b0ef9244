//! # Relation Lists
//!
//! Per-entity lists (children, parents, kill callbacks, callback watchers)
//! stored as spans in flat arenas instead of one `Vec` per entity.
//!
//! ```text
//! spans: [id0: start 0 len 2 cap 2][id1: start 6 len 1 cap 4] ...
//! items: [a][b][ dead  ][c][_][_][_]
//! ```
//!
//! A full span relocates to the end of the arena with double capacity.
//! Abandoned slots are reclaimed by compaction once they outnumber the
//! live ones.

use super::entity::Entity;
use crate::types::ProxyPtr;

/// Compaction is skipped below this many dead slots.
const COMPACT_MIN_DEAD: usize = 64;

#[derive(Clone, Copy, Debug, Default)]
struct Span {
    start: u32,
    len: u32,
    cap: u32,
}

impl Span {
    fn range(self) -> std::ops::Range<usize> {
        self.start as usize..(self.start + self.len) as usize
    }
}

/// Flat storage for many small lists, one per entity id.
#[derive(Debug, Default)]
pub struct ListArena<T: Copy + Default + PartialEq> {
    items: Vec<T>,
    spans: Vec<Span>,
    dead: usize,
}

impl<T: Copy + Default + PartialEq> ListArena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            spans: Vec::new(),
            dead: 0,
        }
    }

    /// Makes lists `0..count` addressable.
    pub fn ensure_lists(&mut self, count: usize) {
        if self.spans.len() < count {
            self.spans.resize(count, Span::default());
        }
    }

    /// Returns list `list`. Unknown lists are empty.
    #[must_use]
    pub fn get(&self, list: u32) -> &[T] {
        match self.spans.get(list as usize) {
            Some(span) => &self.items[span.range()],
            None => &[],
        }
    }

    /// Number of items in list `list`.
    #[must_use]
    pub fn len_of(&self, list: u32) -> usize {
        self.spans.get(list as usize).map_or(0, |s| s.len as usize)
    }

    /// Returns `true` if list `list` holds `item`.
    #[must_use]
    pub fn contains(&self, list: u32, item: &T) -> bool {
        self.get(list).contains(item)
    }

    /// Appends an item.
    pub fn push(&mut self, list: u32, item: T) {
        self.ensure_lists(list as usize + 1);
        let mut span = self.spans[list as usize];
        if span.len == span.cap {
            let new_cap = (span.cap * 2).max(2);
            let start = self.items.len();
            self.items.extend_from_within(span.range());
            self.items.resize(start + new_cap as usize, T::default());
            self.dead += span.cap as usize;
            span.start = start as u32;
            span.cap = new_cap;
        }
        self.items[(span.start + span.len) as usize] = item;
        span.len += 1;
        self.spans[list as usize] = span;
        self.maybe_compact();
    }

    /// Removes the first item matching `predicate` by swapping the last
    /// item of the list into its slot.
    pub fn remove_first_by(&mut self, list: u32, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let span = self.spans.get_mut(list as usize)?;
        let items = &mut self.items[span.start as usize..(span.start + span.len) as usize];
        let position = items.iter().position(|item| predicate(item))?;
        let removed = items[position];
        let last = items.len() - 1;
        items.swap(position, last);
        span.len -= 1;
        Some(removed)
    }

    /// Removes the first occurrence of `item`.
    pub fn remove_first(&mut self, list: u32, item: &T) -> bool {
        self.remove_first_by(list, |x| x == item).is_some()
    }

    /// Keeps only the items matching `keep`. Order is not preserved.
    pub fn retain(&mut self, list: u32, mut keep: impl FnMut(&T) -> bool) {
        while self.remove_first_by(list, |item| !keep(item)).is_some() {}
    }

    /// Empties a list, keeping its capacity.
    pub fn clear(&mut self, list: u32) {
        if let Some(span) = self.spans.get_mut(list as usize) {
            span.len = 0;
        }
    }

    /// Copies a list out and empties it.
    pub fn take(&mut self, list: u32) -> Vec<T> {
        let items = self.get(list).to_vec();
        self.clear(list);
        items
    }

    /// Total slots in the arena, live or not.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.items.len()
    }

    /// Rewrites the arena without abandoned slots.
    pub fn compact(&mut self) {
        let mut items = Vec::with_capacity(self.items.len() - self.dead);
        for span in &mut self.spans {
            let start = items.len();
            items.extend_from_slice(&self.items[span.start as usize..(span.start + span.cap) as usize]);
            span.start = start as u32;
        }
        self.items = items;
        self.dead = 0;
    }

    fn maybe_compact(&mut self) {
        if self.dead >= COMPACT_MIN_DEAD && self.dead * 2 > self.items.len() {
            self.compact();
        }
    }
}

/// A kill callback owned by one entity and aimed at another.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallbackLink {
    /// Entity the callback reports to.
    pub target: Entity,
    /// Callback value in the zone, viewed through `KillCallback`.
    pub callback: ProxyPtr,
}

/// The dependency graph between entities.
#[derive(Debug, Default)]
pub struct Relations {
    /// Entities killed along with the list owner.
    pub children: ListArena<Entity>,
    /// Entities whose child lists hold the list owner.
    pub parents: ListArena<Entity>,
    /// Kill callbacks owned by the list owner.
    pub callbacks: ListArena<CallbackLink>,
    /// Owners of callbacks that target the list owner.
    pub watchers: ListArena<Entity>,
}

impl Relations {
    /// Makes ids `0..count` addressable in every arena.
    pub fn ensure_ids(&mut self, count: usize) {
        self.children.ensure_lists(count);
        self.parents.ensure_lists(count);
        self.callbacks.ensure_lists(count);
        self.watchers.ensure_lists(count);
    }

    /// Adds a parent → child edge. Returns `false` if it already existed.
    pub fn add_child(&mut self, parent: Entity, child: Entity) -> bool {
        if self.children.contains(parent.id, &child) {
            return false;
        }
        self.children.push(parent.id, child);
        self.parents.push(child.id, parent);
        true
    }

    /// Removes a parent → child edge. Returns `false` if it did not exist.
    pub fn remove_child(&mut self, parent: Entity, child: Entity) -> bool {
        if !self.children.remove_first(parent.id, &child) {
            return false;
        }
        self.parents.remove_first(child.id, &parent);
        true
    }

    /// Records a callback and its back-reference on the target.
    pub fn add_callback(&mut self, owner: Entity, link: CallbackLink) {
        self.callbacks.push(owner.id, link);
        self.watchers.push(link.target.id, owner);
    }

    /// Removes every parent and child edge of `entity`.
    pub fn detach(&mut self, entity: Entity) {
        for parent in self.parents.take(entity.id) {
            self.children.remove_first(parent.id, &entity);
        }
        for child in self.children.take(entity.id) {
            self.parents.remove_first(child.id, &entity);
        }
    }

    /// Returns `true` if `entity` appears in no list of its own.
    #[must_use]
    pub fn is_clear(&self, entity: Entity) -> bool {
        self.children.len_of(entity.id) == 0
            && self.parents.len_of(entity.id) == 0
            && self.callbacks.len_of(entity.id) == 0
            && self.watchers.len_of(entity.id) == 0
    }
}
