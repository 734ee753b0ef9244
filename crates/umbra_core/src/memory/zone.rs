//! # Zone Allocator
//!
//! One contiguous, growable region managed as a doubly-linked list of
//! free/used blocks.
//!
//! ## Layout
//!
//! ```text
//! offset 0            16                         size
//! | sentinel header | header | data ... | header | data ... |
//!                   ^ first block       ^ next block
//! ```
//!
//! Every header stores `prev`/`next` as offsets from the zone base. Growing
//! the zone reallocates the backing buffer, and because no link is an
//! address, every handle issued before the growth stays valid. Resolved
//! slices do not survive: they borrow the zone, so the borrow checker
//! refuses to keep one across an allocating call.
//!
//! ## Allocation
//!
//! Next-fit: the search starts at the rover (the block after the last
//! allocation) and wraps once around the list. Blocks whose remainder is
//! at least [`MIN_FRAGMENT`] bytes are split. When nothing fits, the zone
//! grows explicitly and the search is retried.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use super::handle::{AllocatorId, MemPtr};
use crate::config::RuntimeConfig;
use crate::error::{CoreError, CoreResult};

/// Block granularity in bytes. Every block offset and size is a multiple.
pub const BLOCK_ALIGN: usize = 16;

/// Size of a block header.
pub const HEADER_SIZE: usize = 16;

/// Smallest remainder worth splitting off as a free block.
pub const MIN_FRAGMENT: usize = 64;

/// Largest zone representable with `i32` handle offsets.
pub const MAX_ZONE_BYTES: usize = (i32::MAX as usize) & !(BLOCK_ALIGN - 1);

/// Largest alignment a value stored in the zone may require.
///
/// The backing buffer is a `Vec<u64>`, so block data is 8-byte aligned.
pub const MAX_VALUE_ALIGN: usize = 8;

const STATE_FREE: u16 = 0xF4EE;
const STATE_USED: u16 = 0x05ED;

/// Offset of the first data byte a valid handle can point at.
const FIRST_DATA_OFFSET: usize = 2 * HEADER_SIZE;

/// Block metadata, stored in-band at the start of every block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct BlockHeader {
    /// Total block size including this header.
    size: u32,
    /// Offset of the previous block header (0 = sentinel).
    prev: u32,
    /// Offset of the next block header (0 = sentinel).
    next: u32,
    /// `STATE_FREE` or `STATE_USED`; anything else is corruption.
    state: u16,
    /// Owning zone, checked on free.
    zone: u16,
}

/// Result of a full heap walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes in used blocks, headers included.
    pub used_bytes: usize,
    /// Bytes in free blocks, headers included.
    pub free_bytes: usize,
    /// Number of used blocks.
    pub used_blocks: usize,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Size of the largest free block.
    pub largest_free: usize,
}

/// Counters maintained without walking the heap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ZoneStats {
    /// Current zone size in bytes.
    pub capacity: usize,
    /// Bytes held by live blocks, headers included.
    pub used_bytes: usize,
    /// Number of live blocks.
    pub live_blocks: usize,
    /// Number of times the zone has grown.
    pub grow_count: u32,
}

/// A relocatable zone of memory.
pub struct MemZone {
    /// Backing storage. `u64` words give 8-byte alignment to block data.
    words: Vec<u64>,
    /// Zone id stamped into handles and block headers.
    zone_id: u16,
    /// Allocator that owns this zone.
    allocator: AllocatorId,
    /// Next-fit cursor: header offset where the next search starts.
    rover: u32,
    /// Multiplier applied on growth.
    growth_factor: usize,
    /// Hard size ceiling.
    max_bytes: usize,
    /// Bytes held by used blocks.
    used_bytes: usize,
    /// Number of used blocks.
    used_blocks: usize,
    /// Number of growths.
    grow_count: u32,
}

impl MemZone {
    /// Creates a zone of at least `initial_bytes`.
    ///
    /// # Arguments
    ///
    /// * `zone_id` - Id stamped into handles and headers
    /// * `allocator` - Owning allocator
    /// * `initial_bytes` - Starting size (rounded up to [`BLOCK_ALIGN`])
    /// * `growth_factor` - Size multiplier applied on growth
    /// * `max_bytes` - Ceiling past which allocation fails
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OutOfMemory`] if `initial_bytes` exceeds the
    /// ceiling.
    pub fn new(
        zone_id: u16,
        allocator: AllocatorId,
        initial_bytes: usize,
        growth_factor: usize,
        max_bytes: usize,
    ) -> CoreResult<Self> {
        let max_bytes = max_bytes.min(MAX_ZONE_BYTES) & !(BLOCK_ALIGN - 1);
        let size = round_up(initial_bytes.max(FIRST_DATA_OFFSET + MIN_FRAGMENT));
        if size > max_bytes {
            return Err(CoreError::OutOfMemory {
                requested: size,
                limit: max_bytes,
            });
        }

        let mut zone = Self {
            words: vec![0u64; size / 8],
            zone_id,
            allocator,
            rover: HEADER_SIZE as u32,
            growth_factor: growth_factor.max(2),
            max_bytes,
            used_bytes: 0,
            used_blocks: 0,
            grow_count: 0,
        };

        let first = HEADER_SIZE as u32;
        zone.set_header(
            0,
            BlockHeader {
                size: HEADER_SIZE as u32,
                prev: first,
                next: first,
                state: STATE_USED,
                zone: zone_id,
            },
        );
        zone.set_header(
            first,
            BlockHeader {
                size: (size - HEADER_SIZE) as u32,
                prev: 0,
                next: 0,
                state: STATE_FREE,
                zone: zone_id,
            },
        );
        Ok(zone)
    }

    /// Creates a zone sized and limited by a [`RuntimeConfig`].
    ///
    /// # Errors
    ///
    /// See [`MemZone::new`].
    pub fn with_config(
        zone_id: u16,
        allocator: AllocatorId,
        config: &RuntimeConfig,
    ) -> CoreResult<Self> {
        Self::new(
            zone_id,
            allocator,
            config.initial_zone_bytes,
            config.zone_growth_factor,
            config.max_zone_bytes,
        )
    }

    /// Returns the zone id.
    #[inline]
    #[must_use]
    pub const fn zone_id(&self) -> u16 {
        self.zone_id
    }

    /// Returns the owning allocator.
    #[inline]
    #[must_use]
    pub const fn allocator(&self) -> AllocatorId {
        self.allocator
    }

    /// Returns the current zone size in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.words.len() * 8
    }

    /// Returns the cheap counters.
    #[must_use]
    pub fn stats(&self) -> ZoneStats {
        ZoneStats {
            capacity: self.size(),
            used_bytes: self.used_bytes,
            live_blocks: self.used_blocks,
            grow_count: self.grow_count,
        }
    }

    // =========================================================================
    // Allocate / free
    // =========================================================================

    /// Allocates `size` zeroed bytes and returns a handle to them.
    ///
    /// `size == 0` returns the zero-sized placeholder without touching the
    /// block list.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OutOfMemory`] if the zone cannot grow enough.
    pub fn allocate(&mut self, size: usize) -> CoreResult<MemPtr> {
        if size == 0 {
            return Ok(MemPtr::zero_sized(self.zone_id, self.allocator));
        }
        let need = self.block_size_for(size)?;

        if let Some(ptr) = self.try_allocate(need) {
            return Ok(ptr);
        }
        self.grow(need)?;
        self.try_allocate(need).ok_or(CoreError::OutOfMemory {
            requested: size,
            limit: self.max_bytes,
        })
    }

    /// Allocates a block holding `value`.
    ///
    /// # Errors
    ///
    /// Propagates allocation and cast failures.
    pub fn allocate_value<T: Pod>(&mut self, value: T) -> CoreResult<MemPtr> {
        let ptr = self.allocate(std::mem::size_of::<T>())?;
        *self.value_mut::<T>(ptr)? = value;
        Ok(ptr)
    }

    /// Frees a block and coalesces it with free neighbours.
    ///
    /// Freeing the zero-sized placeholder is a no-op.
    ///
    /// # Errors
    ///
    /// - [`CoreError::ForeignHandle`] if the handle belongs elsewhere
    /// - [`CoreError::InvalidHandle`] for null, misaligned or out-of-range offsets
    /// - [`CoreError::DoubleFree`] if the block is already free
    /// - [`CoreError::CorruptBlock`] if the header fails its sanity checks
    pub fn free(&mut self, ptr: MemPtr) -> CoreResult<()> {
        self.check_owner(ptr)?;
        if ptr.is_zero_sized() {
            return Ok(());
        }
        let mut block = self.block_of(ptr)?;
        let mut header = self.header(block);
        match header.state {
            STATE_USED => {}
            STATE_FREE => return Err(CoreError::DoubleFree(ptr.offset)),
            _ => {
                return Err(CoreError::CorruptBlock {
                    offset: block,
                    reason: "bad state magic",
                })
            }
        }
        if header.zone != self.zone_id {
            return Err(CoreError::CorruptBlock {
                offset: block,
                reason: "foreign zone id",
            });
        }

        self.used_bytes -= header.size as usize;
        self.used_blocks -= 1;
        header.state = STATE_FREE;
        self.set_header(block, header);

        if header.prev != 0 {
            let mut prev = self.header(header.prev);
            if prev.state == STATE_FREE {
                prev.size += header.size;
                prev.next = header.next;
                self.set_header(header.prev, prev);
                self.set_prev(header.next, header.prev);
                if self.rover == block {
                    self.rover = header.prev;
                }
                block = header.prev;
                header = prev;
            }
        }

        if header.next != 0 {
            let next = self.header(header.next);
            if next.state == STATE_FREE {
                let absorbed = header.next;
                header.size += next.size;
                header.next = next.next;
                self.set_header(block, header);
                self.set_prev(next.next, block);
                if self.rover == absorbed {
                    self.rover = block;
                }
            }
        }

        #[cfg(feature = "validation")]
        self.check_heap()?;
        Ok(())
    }

    /// Moves a block's contents into a block of `new_size` bytes.
    ///
    /// The first `min(old, new)` bytes are preserved; the old handle is
    /// freed and must not be used again.
    ///
    /// # Errors
    ///
    /// Propagates allocation and free failures.
    pub fn reallocate(&mut self, ptr: MemPtr, new_size: usize) -> CoreResult<MemPtr> {
        let old_len = if ptr.is_zero_sized() {
            self.check_owner(ptr)?;
            0
        } else {
            self.block_capacity(ptr)?
        };
        let new_ptr = self.allocate(new_size)?;
        let keep = old_len.min(new_size);
        if keep > 0 {
            self.copy(ptr, new_ptr, keep)?;
        }
        self.free(ptr)?;
        Ok(new_ptr)
    }

    /// Returns `true` if `ptr` names a live block of this zone.
    #[must_use]
    pub fn is_live(&self, ptr: MemPtr) -> bool {
        if self.check_owner(ptr).is_err() {
            return false;
        }
        if ptr.is_zero_sized() {
            return true;
        }
        self.block_of(ptr)
            .map(|block| self.header(block).state == STATE_USED)
            .unwrap_or(false)
    }

    /// Returns the number of data bytes the block behind `ptr` can hold.
    ///
    /// # Errors
    ///
    /// Fails for handles that do not name a live block.
    pub fn block_capacity(&self, ptr: MemPtr) -> CoreResult<usize> {
        self.check_owner(ptr)?;
        if ptr.is_zero_sized() {
            return Ok(0);
        }
        let block = self.block_of(ptr)?;
        let header = self.live_header(ptr, block)?;
        Ok(header.size as usize - HEADER_SIZE)
    }

    // =========================================================================
    // Resolve
    // =========================================================================

    /// Resolves `len` bytes behind a handle.
    ///
    /// The slice borrows the zone; it cannot outlive the next allocation.
    ///
    /// # Errors
    ///
    /// Fails for foreign, dangling or undersized handles.
    pub fn bytes(&self, ptr: MemPtr, len: usize) -> CoreResult<&[u8]> {
        let range = self.data_range(ptr, len)?;
        Ok(&self.raw()[range])
    }

    /// Resolves `len` bytes behind a handle, mutably.
    ///
    /// # Errors
    ///
    /// See [`MemZone::bytes`].
    pub fn bytes_mut(&mut self, ptr: MemPtr, len: usize) -> CoreResult<&mut [u8]> {
        let range = self.data_range(ptr, len)?;
        Ok(&mut self.raw_mut()[range])
    }

    /// Resolves `len` values of `T` behind a handle.
    ///
    /// # Errors
    ///
    /// See [`MemZone::bytes`]; also fails if the cast is misaligned.
    pub fn slice<T: Pod>(&self, ptr: MemPtr, len: usize) -> CoreResult<&[T]> {
        let bytes = self.bytes(ptr, byte_len::<T>(len)?)?;
        Ok(bytemuck::try_cast_slice(bytes)?)
    }

    /// Resolves `len` values of `T` behind a handle, mutably.
    ///
    /// # Errors
    ///
    /// See [`MemZone::slice`].
    pub fn slice_mut<T: Pod>(&mut self, ptr: MemPtr, len: usize) -> CoreResult<&mut [T]> {
        let bytes = self.bytes_mut(ptr, byte_len::<T>(len)?)?;
        Ok(bytemuck::try_cast_slice_mut(bytes)?)
    }

    /// Resolves a single `T` behind a handle.
    ///
    /// # Errors
    ///
    /// See [`MemZone::slice`].
    pub fn value<T: Pod>(&self, ptr: MemPtr) -> CoreResult<&T> {
        let bytes = self.bytes(ptr, std::mem::size_of::<T>())?;
        Ok(bytemuck::try_from_bytes(bytes)?)
    }

    /// Resolves a single `T` behind a handle, mutably.
    ///
    /// # Errors
    ///
    /// See [`MemZone::slice`].
    pub fn value_mut<T: Pod>(&mut self, ptr: MemPtr) -> CoreResult<&mut T> {
        let bytes = self.bytes_mut(ptr, std::mem::size_of::<T>())?;
        Ok(bytemuck::try_from_bytes_mut(bytes)?)
    }

    /// Resolves two disjoint blocks mutably at the same time.
    ///
    /// # Errors
    ///
    /// Fails if either handle is invalid or the ranges overlap.
    pub fn pair_mut(
        &mut self,
        a: MemPtr,
        len_a: usize,
        b: MemPtr,
        len_b: usize,
    ) -> CoreResult<(&mut [u8], &mut [u8])> {
        let ra = self.data_range(a, len_a)?;
        let rb = self.data_range(b, len_b)?;
        if ra.start < rb.end && rb.start < ra.end {
            return Err(CoreError::InvalidHandle(b));
        }
        let bytes = self.raw_mut();
        if ra.start <= rb.start {
            let (lo, hi) = bytes.split_at_mut(rb.start);
            Ok((&mut lo[ra], &mut hi[..rb.len()]))
        } else {
            let (lo, hi) = bytes.split_at_mut(ra.start);
            Ok((&mut hi[..ra.len()], &mut lo[rb]))
        }
    }

    /// Typed variant of [`MemZone::pair_mut`].
    ///
    /// # Errors
    ///
    /// See [`MemZone::pair_mut`].
    pub fn pair_slices_mut<A: Pod, B: Pod>(
        &mut self,
        a: MemPtr,
        len_a: usize,
        b: MemPtr,
        len_b: usize,
    ) -> CoreResult<(&mut [A], &mut [B])> {
        let (bytes_a, bytes_b) =
            self.pair_mut(a, byte_len::<A>(len_a)?, b, byte_len::<B>(len_b)?)?;
        Ok((
            bytemuck::try_cast_slice_mut(bytes_a)?,
            bytemuck::try_cast_slice_mut(bytes_b)?,
        ))
    }

    /// Copies `len` bytes from one block to another.
    ///
    /// # Errors
    ///
    /// Fails if either handle cannot hold `len` bytes.
    pub fn copy(&mut self, src: MemPtr, dst: MemPtr, len: usize) -> CoreResult<()> {
        let from = self.data_range(src, len)?;
        let to = self.data_range(dst, len)?;
        self.raw_mut().copy_within(from, to.start);
        Ok(())
    }

    // =========================================================================
    // Growth
    // =========================================================================

    /// Grows the zone so that a block of `need` bytes fits at the end.
    ///
    /// All issued handles stay valid; all resolved slices are invalidated
    /// (the borrow checker already forbids holding them here).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OutOfMemory`] if the ceiling would be exceeded.
    pub fn grow(&mut self, need: usize) -> CoreResult<()> {
        let old = self.size();
        let out_of_memory = CoreError::OutOfMemory {
            requested: need,
            limit: self.max_bytes,
        };
        let wanted = old.checked_add(need).ok_or_else(|| out_of_memory.clone())?;
        let new_size = round_up(old.saturating_mul(self.growth_factor).max(wanted))
            .min(self.max_bytes);
        if new_size < wanted {
            return Err(out_of_memory);
        }

        self.words.resize(new_size / 8, 0);
        let extra = (new_size - old) as u32;

        let last = self.header(0).prev;
        let mut tail = self.header(last);
        if last != 0 && tail.state == STATE_FREE {
            tail.size += extra;
            self.set_header(last, tail);
        } else {
            let block = old as u32;
            self.set_header(
                block,
                BlockHeader {
                    size: extra,
                    prev: last,
                    next: 0,
                    state: STATE_FREE,
                    zone: self.zone_id,
                },
            );
            self.set_next(last, block);
            self.set_prev(0, block);
        }

        self.grow_count += 1;
        debug!(
            zone = self.zone_id,
            allocator = self.allocator.raw(),
            old_bytes = old,
            new_bytes = new_size,
            "zone grown"
        );
        Ok(())
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Walks the whole block list and validates every invariant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptBlock`] naming the first bad block.
    pub fn check_heap(&self) -> CoreResult<HeapStats> {
        let size = self.size();
        let sentinel = self.header(0);
        if sentinel.state != STATE_USED || sentinel.size as usize != HEADER_SIZE {
            return Err(CoreError::CorruptBlock {
                offset: 0,
                reason: "bad sentinel",
            });
        }

        let mut stats = HeapStats::default();
        let mut expected = HEADER_SIZE as u32;
        let mut prev = 0u32;
        let mut cur = sentinel.next;
        let mut prev_free = false;
        let corrupt = |offset, reason| CoreError::CorruptBlock { offset, reason };

        while cur != 0 {
            if cur != expected {
                return Err(corrupt(cur, "blocks not contiguous"));
            }
            if cur as usize + HEADER_SIZE > size {
                return Err(corrupt(cur, "header past end of zone"));
            }
            let header = self.header(cur);
            if header.prev != prev {
                return Err(corrupt(cur, "prev link mismatch"));
            }
            if header.zone != self.zone_id {
                return Err(corrupt(cur, "foreign zone id"));
            }
            let block_size = header.size as usize;
            if block_size < HEADER_SIZE || block_size % BLOCK_ALIGN != 0 {
                return Err(corrupt(cur, "bad block size"));
            }
            match header.state {
                STATE_FREE => {
                    if prev_free {
                        return Err(corrupt(cur, "adjacent free blocks"));
                    }
                    stats.free_bytes += block_size;
                    stats.free_blocks += 1;
                    stats.largest_free = stats.largest_free.max(block_size);
                    prev_free = true;
                }
                STATE_USED => {
                    stats.used_bytes += block_size;
                    stats.used_blocks += 1;
                    prev_free = false;
                }
                _ => return Err(corrupt(cur, "bad state magic")),
            }
            expected = cur + header.size;
            prev = cur;
            cur = header.next;
        }

        if expected as usize != size {
            return Err(corrupt(expected, "blocks do not cover zone"));
        }
        if sentinel.prev != prev {
            return Err(corrupt(0, "sentinel prev mismatch"));
        }
        debug_assert_eq!(stats.used_bytes, self.used_bytes);
        Ok(stats)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn try_allocate(&mut self, need: usize) -> Option<MemPtr> {
        let start = self.rover;
        let mut cur = start;
        loop {
            let header = self.header(cur);
            if header.state == STATE_FREE && header.size as usize >= need {
                return Some(self.claim(cur, header, need));
            }
            cur = header.next;
            if cur == start {
                return None;
            }
        }
    }

    fn claim(&mut self, block: u32, mut header: BlockHeader, need: usize) -> MemPtr {
        let remainder = header.size as usize - need;
        if remainder >= MIN_FRAGMENT {
            let split = block + need as u32;
            self.set_header(
                split,
                BlockHeader {
                    size: remainder as u32,
                    prev: block,
                    next: header.next,
                    state: STATE_FREE,
                    zone: self.zone_id,
                },
            );
            self.set_prev(header.next, split);
            header.next = split;
            header.size = need as u32;
        }
        header.state = STATE_USED;
        header.zone = self.zone_id;
        self.set_header(block, header);

        self.rover = header.next;
        self.used_bytes += header.size as usize;
        self.used_blocks += 1;

        let data = block as usize + HEADER_SIZE;
        let end = block as usize + header.size as usize;
        self.raw_mut()[data..end].fill(0);
        MemPtr::new(data as i32, self.zone_id, self.allocator)
    }

    fn block_size_for(&self, size: usize) -> CoreResult<usize> {
        size.checked_add(HEADER_SIZE + BLOCK_ALIGN - 1)
            .filter(|&n| n <= self.max_bytes)
            .map(|n| (n & !(BLOCK_ALIGN - 1)).max(MIN_FRAGMENT))
            .ok_or(CoreError::OutOfMemory {
                requested: size,
                limit: self.max_bytes,
            })
    }

    fn check_owner(&self, ptr: MemPtr) -> CoreResult<()> {
        if ptr.is_null() {
            return Err(CoreError::InvalidHandle(ptr));
        }
        if ptr.allocator != self.allocator.raw() || ptr.zone != self.zone_id {
            return Err(CoreError::ForeignHandle {
                handle: ptr,
                expected: self.allocator.raw(),
            });
        }
        Ok(())
    }

    /// Maps a data handle to its header offset, validating range and alignment.
    fn block_of(&self, ptr: MemPtr) -> CoreResult<u32> {
        let offset = usize::try_from(ptr.offset).map_err(|_| CoreError::InvalidHandle(ptr))?;
        if offset < FIRST_DATA_OFFSET || offset >= self.size() || offset % BLOCK_ALIGN != 0 {
            return Err(CoreError::InvalidHandle(ptr));
        }
        Ok((offset - HEADER_SIZE) as u32)
    }

    fn live_header(&self, ptr: MemPtr, block: u32) -> CoreResult<BlockHeader> {
        let header = self.header(block);
        match header.state {
            STATE_USED => Ok(header),
            STATE_FREE => Err(CoreError::InvalidHandle(ptr)),
            _ => Err(CoreError::CorruptBlock {
                offset: block,
                reason: "bad state magic",
            }),
        }
    }

    fn data_range(&self, ptr: MemPtr, len: usize) -> CoreResult<Range<usize>> {
        self.check_owner(ptr)?;
        if ptr.is_zero_sized() {
            if len == 0 {
                return Ok(0..0);
            }
            return Err(CoreError::OutOfBounds {
                requested: len,
                available: 0,
            });
        }
        let block = self.block_of(ptr)?;
        let header = self.live_header(ptr, block)?;
        let available = header.size as usize - HEADER_SIZE;
        if len > available {
            return Err(CoreError::OutOfBounds {
                requested: len,
                available,
            });
        }
        let start = block as usize + HEADER_SIZE;
        Ok(start..start + len)
    }

    #[inline]
    fn raw(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    #[inline]
    fn raw_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.words)
    }

    #[inline]
    fn header(&self, offset: u32) -> BlockHeader {
        let start = offset as usize;
        bytemuck::pod_read_unaligned(&self.raw()[start..start + HEADER_SIZE])
    }

    #[inline]
    fn set_header(&mut self, offset: u32, header: BlockHeader) {
        let start = offset as usize;
        self.raw_mut()[start..start + HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
    }

    fn set_prev(&mut self, offset: u32, prev: u32) {
        let mut header = self.header(offset);
        header.prev = prev;
        self.set_header(offset, header);
    }

    fn set_next(&mut self, offset: u32, next: u32) {
        let mut header = self.header(offset);
        header.next = next;
        self.set_header(offset, header);
    }
}

impl std::fmt::Debug for MemZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemZone")
            .field("zone_id", &self.zone_id)
            .field("allocator", &self.allocator)
            .field("size", &self.size())
            .field("used_bytes", &self.used_bytes)
            .field("used_blocks", &self.used_blocks)
            .field("rover", &self.rover)
            .finish()
    }
}

#[inline]
const fn round_up(n: usize) -> usize {
    (n + BLOCK_ALIGN - 1) & !(BLOCK_ALIGN - 1)
}

fn byte_len<T>(len: usize) -> CoreResult<usize> {
    len.checked_mul(std::mem::size_of::<T>())
        .ok_or(CoreError::OutOfBounds {
            requested: usize::MAX,
            available: 0,
        })
}
