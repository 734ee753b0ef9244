//! # Entity Handles
//!
//! An entity is a plain-data handle:
//! - An id indexing the allocator's per-entity arrays
//! - A generation counter for safe reuse
//! - The id of the allocator that issued it
//!
//! Generations alternate between two phases. Odd means the id is alive,
//! even means it sits in the free pool. Every create and every destroy
//! bumps the counter once, so a stale handle never matches again.

use bytemuck::{Pod, Zeroable};

use crate::memory::AllocatorId;

/// Handle to an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(C)]
pub struct Entity {
    /// Index into per-entity arrays.
    pub id: u32,
    /// Generation when the handle was issued.
    pub generation: u32,
    /// Issuing allocator.
    pub allocator: u16,
    reserved: u16,
}

impl Entity {
    /// The null entity. Never alive.
    pub const NULL: Self = Self {
        id: 0,
        generation: 0,
        allocator: 0,
        reserved: 0,
    };

    /// Creates a handle.
    ///
    /// # Arguments
    ///
    /// * `id` - Index into per-entity arrays
    /// * `generation` - Generation counter (odd for a live handle)
    /// * `allocator` - Issuing allocator
    #[inline]
    #[must_use]
    pub const fn new(id: u32, generation: u32, allocator: AllocatorId) -> Self {
        Self {
            id,
            generation,
            allocator: allocator.raw(),
            reserved: 0,
        }
    }

    /// Returns `true` for the null entity.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.generation == 0 && self.allocator == 0
    }

    /// Returns the id as a `usize` for table lookups.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.id as usize
    }

    /// Returns the issuing allocator.
    #[inline]
    #[must_use]
    pub const fn allocator_id(self) -> AllocatorId {
        AllocatorId(self.allocator)
    }

    /// Returns `true` if a generation is in the alive phase.
    #[inline]
    #[must_use]
    pub const fn is_alive_generation(generation: u32) -> bool {
        generation & 1 == 1
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}@A{}", self.id, self.generation, self.allocator)
    }
}
