//! # Core Error Types
//!
//! Every failure the runtime can report. None of these are transient: they
//! signal a programming error in the calling system (or an exhausted zone)
//! and are never retried.

use thiserror::Error;

use crate::ecs::Entity;
use crate::memory::MemPtr;

/// Errors that can occur in the core runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    // =========================================================================
    // Setup / configuration
    // =========================================================================
    /// A type was used before being registered with the type registry.
    #[error("type not registered: {0}")]
    TypeNotRegistered(&'static str),

    /// A proxy contract was used before any type was registered against it.
    #[error("proxy not registered: {0}")]
    ProxyNotRegistered(&'static str),

    /// The same (type, proxy) pair was registered twice.
    #[error("duplicate proxy registration: {type_name} already implements {proxy}")]
    DuplicateProxy {
        /// The concrete type.
        type_name: &'static str,
        /// The proxy contract.
        proxy: &'static str,
    },

    /// A method table did not match the contract's method count.
    #[error("{type_name} supplies {found} methods for {proxy}, contract declares {expected}")]
    MethodCountMismatch {
        /// The concrete type.
        type_name: &'static str,
        /// The proxy contract.
        proxy: &'static str,
        /// Methods declared by the contract.
        expected: usize,
        /// Methods supplied by the type.
        found: usize,
    },

    /// A type cannot live in the zone (zero-sized or over-aligned).
    #[error("unsupported layout for {type_name}: size {size}, align {align}")]
    UnsupportedLayout {
        /// The offending type.
        type_name: &'static str,
        /// Its size in bytes.
        size: usize,
        /// Its alignment in bytes.
        align: usize,
    },

    /// Invalid runtime configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every allocator id is in use.
    #[error("allocator ids exhausted")]
    AllocatorIdsExhausted,

    // =========================================================================
    // Invariant violations
    // =========================================================================
    /// A handle is null, misaligned or points outside the zone.
    #[error("invalid handle: {0:?}")]
    InvalidHandle(MemPtr),

    /// A handle belongs to a different allocator or zone.
    #[error("handle {handle:?} does not belong to allocator {expected}")]
    ForeignHandle {
        /// The rejected handle.
        handle: MemPtr,
        /// The allocator that was asked to resolve it.
        expected: u16,
    },

    /// A block was freed twice.
    #[error("double free at offset {0}")]
    DoubleFree(i32),

    /// Block metadata failed its sanity checks.
    #[error("corrupt block at offset {offset}: {reason}")]
    CorruptBlock {
        /// Offset of the block header.
        offset: u32,
        /// What failed.
        reason: &'static str,
    },

    /// A resolve asked for more bytes than the block holds.
    #[error("access of {requested} bytes exceeds block of {available} bytes")]
    OutOfBounds {
        /// Bytes requested.
        requested: usize,
        /// Bytes available in the block.
        available: usize,
    },

    /// An operation required a live entity.
    #[error("entity not alive: {0}")]
    EntityNotAlive(Entity),

    /// No delegates exist for a (type, proxy) pair.
    #[error("no delegates for type {type_index} under proxy {proxy_index}")]
    ProxyNotFound {
        /// Raw type index.
        type_index: u16,
        /// Raw proxy index.
        proxy_index: u16,
    },

    /// A method ordinal past the end of the contract.
    #[error("method ordinal {ordinal} out of range for {proxy} ({count} methods)")]
    MethodOutOfRange {
        /// The proxy contract.
        proxy: &'static str,
        /// Requested ordinal.
        ordinal: usize,
        /// Methods in the contract.
        count: usize,
    },

    /// A proxy pointer was invoked through the wrong contract.
    #[error("proxy pointer describes {found}, invoked as {expected}")]
    ProxyMismatch {
        /// Contract used at the call site.
        expected: &'static str,
        /// Contract recorded in the pointer.
        found: &'static str,
    },

    /// Byte view could not be cast to the requested type.
    #[error("pod cast failed: {0:?}")]
    PodCast(bytemuck::PodCastError),

    // =========================================================================
    // Resources
    // =========================================================================
    /// The zone could not grow to satisfy an allocation.
    #[error("out of memory: requested {requested} bytes, zone limit {limit}")]
    OutOfMemory {
        /// Bytes requested.
        requested: usize,
        /// Maximum zone size.
        limit: usize,
    },
}

impl From<bytemuck::PodCastError> for CoreError {
    fn from(err: bytemuck::PodCastError) -> Self {
        Self::PodCast(err)
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
