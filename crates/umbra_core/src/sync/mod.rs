//! # Synchronization Primitives
//!
//! A world is single-threaded and holds no locks. The few cells that are
//! shared across worlds (the allocator id pool) sit behind a reentrant
//! spin lock.
//!
//! ```text
//! Thread 1: World A ─┐
//!                    ├──► SharedCell<IdPool>  (ReentrantSpinLock)
//! Thread 2: World B ─┘
//! ```
//!
//! The critical sections are a handful of instructions, so spinning beats
//! parking. Reentrancy lets a holder call back into code that takes the
//! same lock.

mod spin_lock;

pub use spin_lock::{
    OwnerThread, RawSpinLock, ReentrantSpinGuard, ReentrantSpinLock, SharedCell,
};
