//! # Zone Handles
//!
//! A [`MemPtr`] names a block by its offset from the zone base. Offsets
//! survive relocation of the backing buffer; addresses do not, which is why
//! nothing in the runtime ever stores a resolved reference.

use bytemuck::{Pod, Zeroable};

/// Identifier of a live allocator.
///
/// Ids are process-unique while the allocator lives and are recycled after
/// it is disposed. Zero is never issued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
#[repr(transparent)]
pub struct AllocatorId(pub u16);

impl AllocatorId {
    /// The "no allocator" id carried by null handles and entities.
    pub const NONE: Self = Self(0);

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns `true` unless this is [`AllocatorId::NONE`].
    #[inline]
    #[must_use]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for AllocatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// Offset-based handle to a block in a zone.
///
/// Layout is `{offset, zone, allocator}`; the handle is plain data and can
/// itself be stored inside zone memory (components may hold handles).
///
/// - `offset == 0` is null (offset 0 is the zone's sentinel header).
/// - `offset < 0` is the zero-sized placeholder returned by `allocate(0)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct MemPtr {
    /// Byte offset of the block's data from the zone base.
    pub offset: i32,
    /// Zone the block lives in.
    pub zone: u16,
    /// Allocator that owns the zone.
    pub allocator: u16,
}

impl MemPtr {
    /// The null handle.
    pub const NULL: Self = Self {
        offset: 0,
        zone: 0,
        allocator: 0,
    };

    /// Offset used by zero-sized placeholders.
    pub const ZERO_SIZED_OFFSET: i32 = -1;

    /// Creates a handle.
    #[inline]
    #[must_use]
    pub const fn new(offset: i32, zone: u16, allocator: AllocatorId) -> Self {
        Self {
            offset,
            zone,
            allocator: allocator.0,
        }
    }

    /// Creates the zero-sized placeholder for a zone.
    #[inline]
    #[must_use]
    pub const fn zero_sized(zone: u16, allocator: AllocatorId) -> Self {
        Self::new(Self::ZERO_SIZED_OFFSET, zone, allocator)
    }

    /// Returns `true` for the null handle (offset 0).
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.offset == 0
    }

    /// Returns `true` for a zero-sized placeholder.
    #[inline]
    #[must_use]
    pub const fn is_zero_sized(self) -> bool {
        self.offset < 0
    }

    /// Returns the owning allocator.
    #[inline]
    #[must_use]
    pub const fn allocator_id(self) -> AllocatorId {
        AllocatorId(self.allocator)
    }
}
