//! # World
//!
//! The upward API: one allocator, its entities, their components and the
//! kill/destroy cascade, wired together.
//!
//! A world is single-threaded. Component sets are created lazily, the first
//! time a type is written, and are indexed by the type's registry index.

use std::sync::Arc;

use tracing::{debug, trace};

use super::cascade::{Cascade, KillCallback, KillNotice, TickContext, TickReport};
use super::component_set::{AnyComponentSet, ComponentSet, DestroyHandler};
use super::entity::Entity;
use super::entity_state::EntityStatePart;
use super::relations::CallbackLink;
use crate::config::RuntimeConfig;
use crate::error::{CoreError, CoreResult};
use crate::memory::{Allocator, LocalServices, MemZone};
use crate::types::{Implements, IndexedType, TypeIndex, TypeRegistry};

/// Slot per registered type; `None` until the type is first written.
type SetTable = Vec<Option<Box<dyn AnyComponentSet>>>;

/// Entities, components and teardown for one allocator.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Arc::new(builder.build());
/// let mut world = World::new(registry, RuntimeConfig::default())?;
///
/// let ship = world.create_entity()?;
/// world.get_or_add::<Health>(ship)?.current = 100.0;
///
/// world.request_kill(ship);
/// let report = world.tick(1.0 / 60.0)?;
/// assert!(!world.is_alive(ship));
/// ```
pub struct World {
    registry: Arc<TypeRegistry>,
    config: RuntimeConfig,
    allocator: Allocator,
    entities: EntityStatePart,
    sets: SetTable,
    cascade: Cascade,
}

impl World {
    /// Creates a world with its own allocator.
    ///
    /// # Arguments
    ///
    /// * `registry` - Types and proxies usable in this world
    /// * `config` - Zone and growth tunables
    ///
    /// # Errors
    ///
    /// Fails if `config` is invalid or no allocator id is free.
    pub fn new(registry: Arc<TypeRegistry>, config: RuntimeConfig) -> CoreResult<Self> {
        let allocator = Allocator::new(&config)?;
        let entities = EntityStatePart::new(allocator.id(), config.entity_expand_step);
        debug!(
            allocator = allocator.id().raw(),
            types = registry.type_count(),
            "world created"
        );
        Ok(Self {
            registry,
            config,
            allocator,
            entities,
            sets: Vec::new(),
            cascade: Cascade::new(),
        })
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates a live entity.
    ///
    /// Growing the id space grows every component set's sparse index to
    /// match.
    ///
    /// # Errors
    ///
    /// Propagates id exhaustion and zone allocation failures.
    pub fn create_entity(&mut self) -> CoreResult<Entity> {
        let before = self.entities.capacity();
        let entity = self.entities.create_entity()?;
        let after = self.entities.capacity();
        if after != before {
            self.grow_id_range(after)?;
        }
        Ok(entity)
    }

    /// Destroys an entity immediately, outside the tick.
    ///
    /// Its callbacks are disposed without firing, its relations are dropped,
    /// component destroy handlers and destroy listeners run. Returns `false`
    /// if it was not alive.
    ///
    /// # Errors
    ///
    /// Propagates dispatch and zone errors.
    pub fn destroy_entity(&mut self, entity: Entity) -> CoreResult<bool> {
        if !self.entities.is_alive(entity) {
            return Ok(false);
        }
        let mut ctx = TickContext {
            registry: &self.registry,
            zone: self.allocator.zone_mut(),
            entities: &mut self.entities,
            sets: &mut self.sets,
            bulk_threshold: self.config.bulk_destroy_threshold,
        };
        self.cascade.scrub(entity, &mut ctx)?;
        for set in ctx.sets.iter_mut().flatten() {
            set.destroy_single(ctx.zone, entity)?;
        }
        self.cascade.forget(entity);
        Ok(self.entities.destroy_entity(entity))
    }

    /// Returns `true` if `entity` is alive in this world.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Registers a listener run inside every entity destruction, while the
    /// entity is still alive.
    pub fn on_entity_destroyed(&mut self, listener: impl FnMut(Entity) + 'static) {
        self.entities.add_destroy_listener(listener);
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Returns `entity`'s `T`, adding `T::default()` if absent.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EntityNotAlive`] for dead handles
    /// - [`CoreError::TypeNotRegistered`] if `T` is unknown to the registry
    /// - zone allocation failures
    pub fn get_or_add<T: IndexedType>(&mut self, entity: Entity) -> CoreResult<&mut T> {
        self.require_alive(entity)?;
        let id_range = self.entities.capacity();
        let zone = self.allocator.zone_mut();
        let set = typed_set_mut::<T>(
            &mut self.sets,
            &self.registry,
            zone,
            self.config.initial_component_capacity,
            id_range,
        )?;
        set.get_or_add(zone, entity)
    }

    /// Returns `entity`'s `T`. Dead handles have no components.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unknown to the registry.
    pub fn get<T: IndexedType>(&self, entity: Entity) -> CoreResult<Option<&T>> {
        match self.set::<T>()? {
            Some(set) => set.get(self.allocator.zone(), entity),
            None => Ok(None),
        }
    }

    /// Returns `entity`'s `T` mutably.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unknown to the registry.
    pub fn get_mut<T: IndexedType>(&mut self, entity: Entity) -> CoreResult<Option<&mut T>> {
        let index = self.registry.type_index::<T>()?;
        match typed_set::<T>(&self.sets, index) {
            Some(set) => set.get_mut(self.allocator.zone_mut(), entity),
            None => Ok(None),
        }
    }

    /// Returns `true` if `entity` has a `T`.
    #[must_use]
    pub fn has<T: IndexedType>(&self, entity: Entity) -> bool {
        matches!(self.set::<T>(), Ok(Some(set)) if set.has_element(self.allocator.zone(), entity))
    }

    /// Removes `entity`'s `T` without running its destroy handler.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unknown to the registry.
    pub fn remove<T: IndexedType>(&mut self, entity: Entity) -> CoreResult<bool> {
        let index = self.registry.type_index::<T>()?;
        let zone = self.allocator.zone_mut();
        match self.sets.get_mut(index.as_usize()).and_then(Option::as_mut) {
            Some(set) => set.remove(zone, entity),
            None => Ok(false),
        }
    }

    /// Entities holding a `T`, in dense order.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unknown to the registry.
    pub fn entities_of<T: IndexedType>(&self) -> CoreResult<&[Entity]> {
        match self.set::<T>()? {
            Some(set) => set.entities(self.allocator.zone()),
            None => Ok(&[]),
        }
    }

    /// Every `T`, parallel to [`World::entities_of`].
    ///
    /// # Errors
    ///
    /// Fails if `T` is unknown to the registry.
    pub fn values_of<T: IndexedType>(&self) -> CoreResult<&[T]> {
        match self.set::<T>()? {
            Some(set) => set.values(self.allocator.zone()),
            None => Ok(&[]),
        }
    }

    /// Every `T`, mutably.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unknown to the registry.
    pub fn values_of_mut<T: IndexedType>(&mut self) -> CoreResult<&mut [T]> {
        let index = self.registry.type_index::<T>()?;
        match typed_set::<T>(&self.sets, index) {
            Some(set) => set.values_mut(self.allocator.zone_mut()),
            None => Ok(&mut []),
        }
    }

    /// Iterates (entity, `T`) pairs in dense order.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unknown to the registry.
    pub fn iter<T: IndexedType>(&self) -> CoreResult<impl Iterator<Item = (Entity, &T)> + '_> {
        let entities = self.entities_of::<T>()?;
        let values = self.values_of::<T>()?;
        Ok(entities.iter().copied().zip(values.iter()))
    }

    /// Installs the destroy handler for `T`, creating its set if needed.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unknown to the registry or its set cannot be allocated.
    pub fn register_destroy_handler<T: IndexedType>(
        &mut self,
        handler: impl DestroyHandler<T>,
    ) -> CoreResult<()> {
        let id_range = self.entities.capacity();
        let set = typed_set_mut::<T>(
            &mut self.sets,
            &self.registry,
            self.allocator.zone_mut(),
            self.config.initial_component_capacity,
            id_range,
        )?;
        set.set_destroy_handler(Box::new(handler));
        Ok(())
    }

    // =========================================================================
    // Cascade
    // =========================================================================

    /// Queues a kill for the next tick. Returns `false` if ignored.
    pub fn request_kill(&mut self, entity: Entity) -> bool {
        self.cascade.request_kill(&self.entities, entity)
    }

    /// Schedules a kill after `delay` seconds of ticks. Returns `false` if
    /// ignored, including for a NaN or infinite `delay`.
    pub fn request_delay_kill(&mut self, entity: Entity, delay: f32) -> bool {
        self.cascade.request_delay_kill(&self.entities, entity, delay)
    }

    /// Queues a destroy that skips kill callbacks. Returns `false` if ignored.
    pub fn request_destroy(&mut self, entity: Entity) -> bool {
        self.cascade.request_destroy(&self.entities, entity)
    }

    /// Makes `child` die whenever `parent` is killed.
    ///
    /// Returns `false` if the edge already existed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EntityNotAlive`] if either entity is dead.
    pub fn add_child(&mut self, parent: Entity, child: Entity) -> CoreResult<bool> {
        self.require_alive(parent)?;
        self.require_alive(child)?;
        Ok(self.cascade.relations_mut().add_child(parent, child))
    }

    /// Removes a parent → child edge.
    pub fn remove_child(&mut self, parent: Entity, child: Entity) -> bool {
        self.cascade.relations_mut().remove_child(parent, child)
    }

    /// Children of `parent`.
    #[must_use]
    pub fn children_of(&self, parent: Entity) -> &[Entity] {
        if !self.is_alive(parent) {
            return &[];
        }
        self.cascade.relations().children.get(parent.id)
    }

    /// Attaches a kill callback to `owner`, reporting to `target`.
    ///
    /// `value` is stored in the zone and dispatched through
    /// [`KillCallback`]; `T` must be registered for that contract.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EntityNotAlive`] if either entity is dead
    /// - registry errors if `T` does not implement [`KillCallback`]
    pub fn add_kill_callback<T: Implements<KillCallback>>(
        &mut self,
        owner: Entity,
        target: Entity,
        value: T,
    ) -> CoreResult<()> {
        self.require_alive(owner)?;
        self.require_alive(target)?;
        let zone = self.allocator.zone_mut();
        let data = zone.allocate_value(value)?;
        let callback = match self.registry.proxy_ptr::<T, KillCallback>(data) {
            Ok(callback) => callback,
            Err(err) => {
                zone.free(data)?;
                return Err(err);
            }
        };
        self.cascade
            .relations_mut()
            .add_callback(owner, CallbackLink { target, callback });
        trace!(owner = %owner, target = %target, callback = T::NAME, "kill callback added");
        Ok(())
    }

    /// Runs one tick of the cascade.
    ///
    /// # Errors
    ///
    /// Propagates dispatch and zone errors.
    pub fn tick(&mut self, dt: f32) -> CoreResult<TickReport> {
        let mut ctx = TickContext {
            registry: &self.registry,
            zone: self.allocator.zone_mut(),
            entities: &mut self.entities,
            sets: &mut self.sets,
            bulk_threshold: self.config.bulk_destroy_threshold,
        };
        self.cascade.tick(dt, &mut ctx)
    }

    /// Takes the notices posted by kill callbacks.
    pub fn drain_notices(&mut self) -> Vec<KillNotice> {
        self.cascade.drain_notices()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The allocator.
    #[must_use]
    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    /// The allocator, mutably.
    pub fn allocator_mut(&mut self) -> &mut Allocator {
        &mut self.allocator
    }

    /// The zone.
    #[must_use]
    pub fn zone(&self) -> &MemZone {
        self.allocator.zone()
    }

    /// The allocator's local services.
    pub fn services_mut(&mut self) -> &mut LocalServices {
        self.allocator.services_mut()
    }

    /// Id allocation state.
    #[must_use]
    pub fn entity_state(&self) -> &EntityStatePart {
        &self.entities
    }

    /// Cascade queues and relations.
    #[must_use]
    pub fn cascade(&self) -> &Cascade {
        &self.cascade
    }

    /// The set holding `T`, if it exists yet.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unknown to the registry.
    pub fn set<T: IndexedType>(&self) -> CoreResult<Option<&ComponentSet<T>>> {
        let index = self.registry.type_index::<T>()?;
        Ok(typed_set::<T>(&self.sets, index))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn require_alive(&self, entity: Entity) -> CoreResult<()> {
        if self.entities.is_alive(entity) {
            Ok(())
        } else {
            Err(CoreError::EntityNotAlive(entity))
        }
    }

    fn grow_id_range(&mut self, range: u32) -> CoreResult<()> {
        self.cascade.ensure_ids(range as usize);
        let zone = self.allocator.zone_mut();
        for set in self.sets.iter_mut().flatten() {
            set.ensure_id_range(zone, range)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("allocator", &self.allocator.id())
            .field("entities", &self.entities)
            .field("sets", &self.sets.iter().flatten().count())
            .field("zone", self.allocator.zone())
            .finish()
    }
}

fn typed_set<T: IndexedType>(sets: &[Option<Box<dyn AnyComponentSet>>], index: TypeIndex) -> Option<&ComponentSet<T>> {
    sets.get(index.as_usize())
        .and_then(Option::as_ref)
        .and_then(|set| set.as_any().downcast_ref::<ComponentSet<T>>())
}

fn typed_set_mut<'s, T: IndexedType>(
    sets: &'s mut SetTable,
    registry: &TypeRegistry,
    zone: &mut MemZone,
    capacity: u32,
    id_range: u32,
) -> CoreResult<&'s mut ComponentSet<T>> {
    let index = registry.type_index::<T>()?;
    let slot = index.as_usize();
    if sets.len() <= slot {
        sets.resize_with(slot + 1, || None);
    }
    if sets[slot].is_none() {
        let set = ComponentSet::<T>::new(zone, index, capacity, id_range)?;
        trace!(type_name = T::NAME, capacity, id_range, "component set created");
        sets[slot] = Some(Box::new(set));
    }
    sets[slot]
        .as_mut()
        .and_then(|set| set.as_any_mut().downcast_mut::<ComponentSet<T>>())
        .ok_or(CoreError::TypeNotRegistered(T::NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{KillCallbackArgs, OnKill};
    use bytemuck::{Pod, Zeroable};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl IndexedType for Position {
        const NAME: &'static str = "Position";
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Score {
        points: u32,
    }

    impl IndexedType for Score {
        const NAME: &'static str = "Score";
    }

    #[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
    #[repr(C)]
    struct Bounty {
        code: u32,
    }

    impl IndexedType for Bounty {
        const NAME: &'static str = "Bounty";
    }

    impl OnKill for Bounty {
        fn on_kill(&mut self, args: &mut KillCallbackArgs) {
            args.notify(args.target, self.code);
        }
    }

    fn world() -> World {
        let mut builder = TypeRegistry::builder();
        builder.register_type::<Position>().unwrap();
        builder.register_type::<Score>().unwrap();
        builder.register_proxy::<Bounty, KillCallback>().unwrap();
        let config = RuntimeConfig {
            entity_expand_step: 4,
            ..RuntimeConfig::default()
        };
        World::new(Arc::new(builder.build()), config).unwrap()
    }

    #[test]
    fn test_components_round_trip() {
        let mut world = world();
        let e = world.create_entity().unwrap();
        world.get_or_add::<Position>(e).unwrap().x = 3.0;
        assert!(world.has::<Position>(e));
        assert!(!world.has::<Score>(e));
        assert_eq!(world.get::<Position>(e).unwrap().unwrap().x, 3.0);
        world.get_mut::<Position>(e).unwrap().unwrap().y = 4.0;
        assert_eq!(
            world.values_of::<Position>().unwrap(),
            &[Position { x: 3.0, y: 4.0 }]
        );
        assert!(world.remove::<Position>(e).unwrap());
        assert!(!world.has::<Position>(e));
    }

    #[test]
    fn test_dead_entity_rejected() {
        let mut world = world();
        let e = world.create_entity().unwrap();
        world.destroy_entity(e).unwrap();
        assert_eq!(
            world.get_or_add::<Position>(e).unwrap_err(),
            CoreError::EntityNotAlive(e)
        );
        assert_eq!(world.get::<Position>(e).unwrap(), None);
    }

    #[test]
    fn test_unregistered_type_rejected() {
        #[derive(Clone, Copy, Default, Pod, Zeroable)]
        #[repr(C)]
        struct Stray {
            v: u32,
        }
        impl IndexedType for Stray {
            const NAME: &'static str = "Stray";
        }

        let mut world = world();
        let e = world.create_entity().unwrap();
        assert_eq!(
            world.get_or_add::<Stray>(e).err(),
            Some(CoreError::TypeNotRegistered("Stray"))
        );
    }

    #[test]
    fn test_id_growth_reaches_existing_sets() {
        let mut world = world();
        let first = world.create_entity().unwrap();
        world.get_or_add::<Score>(first).unwrap();
        let mut last = first;
        for _ in 0..20 {
            last = world.create_entity().unwrap();
        }
        world.get_or_add::<Score>(last).unwrap().points = 9;
        assert!(world.set::<Score>().unwrap().unwrap().id_range() >= world.entity_state().capacity());
        assert_eq!(world.get::<Score>(last).unwrap().unwrap().points, 9);
    }

    #[test]
    fn test_destroy_entity_runs_handlers_and_listeners() {
        let mut world = world();
        let log = Rc::new(RefCell::new(Vec::new()));
        let handler_log = log.clone();
        world
            .register_destroy_handler::<Score>(move |_: Entity, s: &mut Score| {
                handler_log.borrow_mut().push(format!("score {}", s.points));
            })
            .unwrap();
        let listener_log = log.clone();
        world.on_entity_destroyed(move |e| listener_log.borrow_mut().push(format!("entity {}", e.id)));

        let e = world.create_entity().unwrap();
        world.get_or_add::<Score>(e).unwrap().points = 5;
        assert!(world.destroy_entity(e).unwrap());
        assert!(!world.destroy_entity(e).unwrap());
        assert_eq!(*log.borrow(), vec!["score 5".to_string(), "entity 0".to_string()]);
    }

    #[test]
    fn test_kill_callback_posts_notice() {
        let mut world = world();
        let victim = world.create_entity().unwrap();
        let hunter = world.create_entity().unwrap();
        world.add_kill_callback(victim, hunter, Bounty { code: 77 }).unwrap();

        assert!(world.request_kill(victim));
        let report = world.tick(0.016).unwrap();
        assert_eq!(report.callbacks_fired, 1);
        assert_eq!(
            world.drain_notices(),
            vec![KillNotice {
                killed: victim,
                target: hunter,
                code: 77
            }]
        );
        assert!(!world.is_alive(victim));
        assert!(world.is_alive(hunter));
        assert_eq!(world.zone().check_heap().unwrap().used_blocks, world.zone().stats().live_blocks);
    }

    #[test]
    fn test_callback_for_unregistered_type_frees_block() {
        let mut world = world();
        let a = world.create_entity().unwrap();
        let before = world.zone().stats().live_blocks;
        let err = world.add_kill_callback(a, a, Score::default());
        assert!(err.is_err());
        assert_eq!(world.zone().stats().live_blocks, before);
    }

    impl OnKill for Score {
        fn on_kill(&mut self, _args: &mut KillCallbackArgs) {}
    }
}
