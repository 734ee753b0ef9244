//! # Memory Management
//!
//! A relocatable zone allocator with offset-based handles.
//!
//! ## Design Philosophy
//!
//! Component data never lives on the general heap. Each allocator owns one
//! contiguous zone:
//! - Blocks are named by offset, so the zone can grow (and move) freely
//! - Raw access is a borrow of the zone, resolved right before use
//! - Every failure is an error value, never a null handle

mod allocator;
mod handle;
mod services;
mod zone;

pub use allocator::Allocator;
pub use handle::{AllocatorId, MemPtr};
pub use services::{LocalService, LocalServices};
pub use zone::{
    HeapStats, MemZone, ZoneStats, BLOCK_ALIGN, HEADER_SIZE, MAX_VALUE_ALIGN, MAX_ZONE_BYTES,
    MIN_FRAGMENT,
};
