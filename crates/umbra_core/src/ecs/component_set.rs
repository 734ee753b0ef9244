//! # Component Sets
//!
//! Dense storage for one component type, living entirely in the zone.
//!
//! ## Memory Layout
//!
//! ```text
//! entities: [E0][E1][E2] ...          dense, `capacity` slots
//! values:   [T0][T1][T2] ...          dense, parallel to `entities`
//! sparse:   [0][3][0][1][2] ...       entity id -> dense index + 1 (0 = absent)
//! ```
//!
//! Removal swaps the last element into the hole, so iteration is always a
//! straight walk over `0..len`. The sparse array stores `index + 1` so
//! that freshly zeroed zone memory already means "absent".

use std::any::Any;
use std::marker::PhantomData;

use tracing::trace;

use super::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::memory::{MemPtr, MemZone};
use crate::types::{IndexedType, TypeIndex};

/// Smallest capacity a set grows to.
const MIN_CAPACITY: u32 = 4;

/// Teardown hook for a component type.
///
/// The single and bulk paths must have the same observable effect; the
/// default bulk path simply loops.
pub trait DestroyHandler<T>: 'static {
    /// Called for one dying entity.
    fn on_destroy(&mut self, entity: Entity, value: &mut T);

    /// Called for a contiguous run of dying entities.
    fn on_destroy_run(&mut self, entities: &[Entity], values: &mut [T]) {
        for (&entity, value) in entities.iter().zip(values.iter_mut()) {
            self.on_destroy(entity, value);
        }
    }
}

impl<T, F> DestroyHandler<T> for F
where
    F: FnMut(Entity, &mut T) + 'static,
{
    fn on_destroy(&mut self, entity: Entity, value: &mut T) {
        self(entity, value);
    }
}

/// Dense (entity, value) storage in a zone.
pub struct ComponentSet<T: IndexedType> {
    type_index: TypeIndex,
    entities: MemPtr,
    values: MemPtr,
    sparse: MemPtr,
    len: u32,
    capacity: u32,
    id_range: u32,
    handler: Option<Box<dyn DestroyHandler<T>>>,
    _marker: PhantomData<T>,
}

impl<T: IndexedType> ComponentSet<T> {
    /// Creates a set and allocates its arrays.
    ///
    /// # Arguments
    ///
    /// * `zone` - Zone holding the arrays
    /// * `type_index` - Registry index of `T`
    /// * `capacity` - Initial dense capacity
    /// * `id_range` - Entity ids the sparse index must cover
    ///
    /// # Errors
    ///
    /// Propagates allocation failures.
    pub fn new(
        zone: &mut MemZone,
        type_index: TypeIndex,
        capacity: u32,
        id_range: u32,
    ) -> CoreResult<Self> {
        let entities = zone.allocate(array_bytes::<Entity>(capacity)?)?;
        let values = zone.allocate(array_bytes::<T>(capacity)?)?;
        let sparse = zone.allocate(array_bytes::<u32>(id_range)?)?;
        Ok(Self {
            type_index,
            entities,
            values,
            sparse,
            len: 0,
            capacity,
            id_range,
            handler: None,
            _marker: PhantomData,
        })
    }

    /// Registry index of `T`.
    #[inline]
    #[must_use]
    pub const fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns `true` if the set holds no element.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Dense capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Entity ids covered by the sparse index.
    #[inline]
    #[must_use]
    pub const fn id_range(&self) -> u32 {
        self.id_range
    }

    /// Installs the teardown hook, replacing any previous one.
    pub fn set_destroy_handler(&mut self, handler: Box<dyn DestroyHandler<T>>) {
        self.handler = Some(handler);
    }

    /// Returns `true` if a teardown hook is installed.
    #[must_use]
    pub fn has_destroy_handler(&self) -> bool {
        self.handler.is_some()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Dense index of `entity`, if it is a member.
    ///
    /// A stale handle whose id now belongs to a newer entity is not a member.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures (a corrupt or foreign zone).
    pub fn index_of(&self, zone: &MemZone, entity: Entity) -> CoreResult<Option<usize>> {
        if entity.id >= self.id_range {
            return Ok(None);
        }
        let slot = zone.slice::<u32>(self.sparse, self.id_range as usize)?[entity.index()];
        if slot == 0 {
            return Ok(None);
        }
        let index = (slot - 1) as usize;
        let stored = zone.slice::<Entity>(self.entities, self.len())?.get(index).copied();
        Ok((stored == Some(entity)).then_some(index))
    }

    /// Returns `true` if `entity` is a member.
    #[must_use]
    pub fn has_element(&self, zone: &MemZone, entity: Entity) -> bool {
        matches!(self.index_of(zone, entity), Ok(Some(_)))
    }

    /// Returns the value of `entity`.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    pub fn get<'z>(&self, zone: &'z MemZone, entity: Entity) -> CoreResult<Option<&'z T>> {
        match self.index_of(zone, entity)? {
            Some(index) => Ok(zone.slice::<T>(self.values, self.len())?.get(index)),
            None => Ok(None),
        }
    }

    /// Returns the value of `entity` mutably.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    pub fn get_mut<'z>(
        &self,
        zone: &'z mut MemZone,
        entity: Entity,
    ) -> CoreResult<Option<&'z mut T>> {
        match self.index_of(zone, entity)? {
            Some(index) => Ok(zone.slice_mut::<T>(self.values, self.len())?.get_mut(index)),
            None => Ok(None),
        }
    }

    /// Returns the value of `entity`, adding `T::default()` if absent.
    ///
    /// # Errors
    ///
    /// Propagates allocation and resolve failures.
    pub fn get_or_add<'z>(&mut self, zone: &'z mut MemZone, entity: Entity) -> CoreResult<&'z mut T> {
        if let Some(index) = self.index_of(zone, entity)? {
            return Ok(&mut zone.slice_mut::<T>(self.values, self.len())?[index]);
        }

        self.ensure_id_range(zone, entity.id.saturating_add(1))?;
        self.ensure_capacity(zone, self.len + 1)?;

        let index = self.len as usize;
        let capacity = self.capacity as usize;
        {
            let (entities, values) = zone.pair_slices_mut::<Entity, T>(
                self.entities,
                capacity,
                self.values,
                capacity,
            )?;
            entities[index] = entity;
            values[index] = T::default();
        }
        self.set_sparse(zone, entity.id, Some(index))?;
        self.len += 1;
        Ok(&mut zone.slice_mut::<T>(self.values, self.len())?[index])
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Removes `entity` by swapping the last element into its slot.
    ///
    /// No destroy handler runs. Returns `false` if it was not a member.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    pub fn remove_swap_back(&mut self, zone: &mut MemZone, entity: Entity) -> CoreResult<bool> {
        let Some(index) = self.index_of(zone, entity)? else {
            return Ok(false);
        };
        let last = self.len() - 1;
        self.swap_elements(zone, index, last)?;
        self.set_sparse(zone, entity.id, None)?;
        self.len -= 1;
        Ok(true)
    }

    /// Runs the single-entity destroy path and removes the element.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    pub fn destroy_single(&mut self, zone: &mut MemZone, entity: Entity) -> CoreResult<bool> {
        let Some(index) = self.index_of(zone, entity)? else {
            return Ok(false);
        };
        if let Some(handler) = self.handler.as_mut() {
            let value = &mut zone.slice_mut::<T>(self.values, self.len as usize)?[index];
            handler.on_destroy(entity, value);
        }
        self.remove_swap_back(zone, entity)
    }

    /// Runs the bulk destroy path for every member of `dying`.
    ///
    /// Members are swapped into one contiguous run at the tail, the handler
    /// sees the whole run at once, then the run is truncated. Returns the
    /// number of elements removed.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    pub fn destroy_bulk(&mut self, zone: &mut MemZone, dying: &[Entity]) -> CoreResult<usize> {
        let mut run = 0usize;
        for &entity in dying {
            if run == self.len() {
                break;
            }
            let Some(index) = self.index_of(zone, entity)? else {
                continue;
            };
            let tail = self.len() - 1 - run;
            if index > tail {
                continue;
            }
            self.swap_elements(zone, index, tail)?;
            run += 1;
        }
        if run == 0 {
            return Ok(0);
        }

        let len = self.len();
        let start = len - run;
        if let Some(handler) = self.handler.as_mut() {
            let (entities, values) =
                zone.pair_slices_mut::<Entity, T>(self.entities, len, self.values, len)?;
            handler.on_destroy_run(&entities[start..], &mut values[start..]);
        }
        for index in start..len {
            let entity = zone.slice::<Entity>(self.entities, len)?[index];
            self.set_sparse(zone, entity.id, None)?;
        }
        self.len = start as u32;
        trace!(type_index = self.type_index.0, removed = run, "bulk destroy");
        Ok(run)
    }

    /// Frees every zone block the set owns and empties it.
    ///
    /// # Errors
    ///
    /// Propagates free failures.
    pub fn release(&mut self, zone: &mut MemZone) -> CoreResult<()> {
        for ptr in [self.entities, self.values, self.sparse] {
            zone.free(ptr)?;
        }
        let placeholder = MemPtr::zero_sized(zone.zone_id(), zone.allocator());
        self.entities = placeholder;
        self.values = placeholder;
        self.sparse = placeholder;
        self.len = 0;
        self.capacity = 0;
        self.id_range = 0;
        Ok(())
    }

    // =========================================================================
    // Bulk access
    // =========================================================================

    /// Member entities in dense order.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    pub fn entities<'z>(&self, zone: &'z MemZone) -> CoreResult<&'z [Entity]> {
        zone.slice::<Entity>(self.entities, self.len())
    }

    /// Values in dense order, parallel to [`ComponentSet::entities`].
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    pub fn values<'z>(&self, zone: &'z MemZone) -> CoreResult<&'z [T]> {
        zone.slice::<T>(self.values, self.len())
    }

    /// Values in dense order, mutably.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    pub fn values_mut<'z>(&self, zone: &'z mut MemZone) -> CoreResult<&'z mut [T]> {
        zone.slice_mut::<T>(self.values, self.len())
    }

    /// Iterates (entity, value) pairs in dense order.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    pub fn iter<'z>(
        &self,
        zone: &'z MemZone,
    ) -> CoreResult<impl Iterator<Item = (Entity, &'z T)> + 'z> {
        let entities = self.entities(zone)?;
        let values = self.values(zone)?;
        Ok(entities.iter().copied().zip(values.iter()))
    }

    /// Iterates (entity, value) pairs in dense order, values mutably.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    pub fn iter_mut<'z>(
        &self,
        zone: &'z mut MemZone,
    ) -> CoreResult<impl Iterator<Item = (Entity, &'z mut T)> + 'z> {
        let len = self.len();
        let (entities, values) =
            zone.pair_slices_mut::<Entity, T>(self.entities, len, self.values, len)?;
        Ok(entities.iter().copied().zip(values.iter_mut()))
    }

    // =========================================================================
    // Growth
    // =========================================================================

    /// Grows the dense arrays to hold at least `min` elements.
    ///
    /// Capacity doubles; elements migrate to the new blocks.
    ///
    /// # Errors
    ///
    /// Propagates allocation failures.
    pub fn ensure_capacity(&mut self, zone: &mut MemZone, min: u32) -> CoreResult<()> {
        if min <= self.capacity {
            return Ok(());
        }
        let new_capacity = self.capacity.saturating_mul(2).max(min).max(MIN_CAPACITY);
        self.entities = zone.reallocate(self.entities, array_bytes::<Entity>(new_capacity)?)?;
        self.values = zone.reallocate(self.values, array_bytes::<T>(new_capacity)?)?;
        trace!(
            type_index = self.type_index.0,
            old = self.capacity,
            new = new_capacity,
            "component set grown"
        );
        self.capacity = new_capacity;
        Ok(())
    }

    /// Grows the sparse index to cover ids `0..range`.
    ///
    /// # Errors
    ///
    /// Propagates allocation failures.
    pub fn ensure_id_range(&mut self, zone: &mut MemZone, range: u32) -> CoreResult<()> {
        if range <= self.id_range {
            return Ok(());
        }
        self.sparse = zone.reallocate(self.sparse, array_bytes::<u32>(range)?)?;
        self.id_range = range;
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn swap_elements(&mut self, zone: &mut MemZone, a: usize, b: usize) -> CoreResult<()> {
        if a == b {
            return Ok(());
        }
        let len = self.len();
        let (entity_a, entity_b) = {
            let (entities, values) =
                zone.pair_slices_mut::<Entity, T>(self.entities, len, self.values, len)?;
            entities.swap(a, b);
            values.swap(a, b);
            (entities[a], entities[b])
        };
        self.set_sparse(zone, entity_a.id, Some(a))?;
        self.set_sparse(zone, entity_b.id, Some(b))
    }

    fn set_sparse(&self, zone: &mut MemZone, id: u32, index: Option<usize>) -> CoreResult<()> {
        let slot = match index {
            Some(index) => u32::try_from(index + 1).map_err(|_| CoreError::OutOfBounds {
                requested: index,
                available: u32::MAX as usize,
            })?,
            None => 0,
        };
        let sparse = zone.slice_mut::<u32>(self.sparse, self.id_range as usize)?;
        let available = sparse.len();
        let cell = sparse
            .get_mut(id as usize)
            .ok_or(CoreError::OutOfBounds {
                requested: id as usize,
                available,
            })?;
        *cell = slot;
        Ok(())
    }
}

impl<T: IndexedType> std::fmt::Debug for ComponentSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentSet")
            .field("type", &T::NAME)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("id_range", &self.id_range)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

fn array_bytes<U>(count: u32) -> CoreResult<usize> {
    (count as usize)
        .checked_mul(std::mem::size_of::<U>())
        .ok_or(CoreError::OutOfMemory {
            requested: usize::MAX,
            limit: crate::memory::MAX_ZONE_BYTES,
        })
}

// =============================================================================
// Type-erased access
// =============================================================================

/// Object-safe view of a [`ComponentSet`] for world-level iteration.
pub trait AnyComponentSet {
    /// Registry index of the component type.
    fn type_index(&self) -> TypeIndex;
    /// Registry name of the component type.
    fn type_name(&self) -> &'static str;
    /// Number of elements.
    fn len(&self) -> usize;
    /// Returns `true` if the set holds no element.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Returns `true` if `entity` is a member.
    fn contains(&self, zone: &MemZone, entity: Entity) -> bool;
    /// Grows the sparse index.
    ///
    /// # Errors
    ///
    /// Propagates allocation failures.
    fn ensure_id_range(&mut self, zone: &mut MemZone, range: u32) -> CoreResult<()>;
    /// Removes without running the destroy handler.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    fn remove(&mut self, zone: &mut MemZone, entity: Entity) -> CoreResult<bool>;
    /// Single destroy path.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    fn destroy_single(&mut self, zone: &mut MemZone, entity: Entity) -> CoreResult<bool>;
    /// Bulk destroy path.
    ///
    /// # Errors
    ///
    /// Propagates resolve failures.
    fn destroy_bulk(&mut self, zone: &mut MemZone, dying: &[Entity]) -> CoreResult<usize>;
    /// Frees the set's zone blocks.
    ///
    /// # Errors
    ///
    /// Propagates free failures.
    fn release(&mut self, zone: &mut MemZone) -> CoreResult<()>;
    /// Downcast support.
    fn as_any(&self) -> &dyn Any;
    /// Downcast support.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: IndexedType> AnyComponentSet for ComponentSet<T> {
    fn type_index(&self) -> TypeIndex {
        self.type_index
    }

    fn type_name(&self) -> &'static str {
        T::NAME
    }

    fn len(&self) -> usize {
        self.len()
    }

    fn contains(&self, zone: &MemZone, entity: Entity) -> bool {
        self.has_element(zone, entity)
    }

    fn ensure_id_range(&mut self, zone: &mut MemZone, range: u32) -> CoreResult<()> {
        ComponentSet::ensure_id_range(self, zone, range)
    }

    fn remove(&mut self, zone: &mut MemZone, entity: Entity) -> CoreResult<bool> {
        self.remove_swap_back(zone, entity)
    }

    fn destroy_single(&mut self, zone: &mut MemZone, entity: Entity) -> CoreResult<bool> {
        ComponentSet::destroy_single(self, zone, entity)
    }

    fn destroy_bulk(&mut self, zone: &mut MemZone, dying: &[Entity]) -> CoreResult<usize> {
        ComponentSet::destroy_bulk(self, zone, dying)
    }

    fn release(&mut self, zone: &mut MemZone) -> CoreResult<()> {
        ComponentSet::release(self, zone)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
