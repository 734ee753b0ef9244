//! # Reentrant Spin Lock
//!
//! A `lock_api` raw mutex that spins on an atomic flag, paired with a
//! per-thread owner id so the same thread may lock it again.
//!
//! ## Safety Note
//!
//! Implementing `lock_api::RawMutex` and `lock_api::GetThreadId` is unsafe:
//! the implementor promises mutual exclusion and stable, unique thread ids.

#![allow(unsafe_code)]

use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::lock_api::{self, GetThreadId, GuardSend, RawMutex};

/// Spinning raw mutex.
#[derive(Debug)]
pub struct RawSpinLock {
    locked: AtomicBool,
}

// SAFETY: `try_lock` succeeds for exactly one caller until `unlock` clears
// the flag; Acquire/Release orders the protected data.
unsafe impl RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        locked: AtomicBool::new(false),
    };

    type GuardMarker = GuardSend;

    fn lock(&self) {
        while !self.try_lock() {
            while self.locked.load(Ordering::Relaxed) {
                std::hint::spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

static NEXT_THREAD_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static THREAD_ID: NonZeroUsize =
        NonZeroUsize::new(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
            .unwrap_or(NonZeroUsize::MIN);
}

/// Owner-id source for [`ReentrantSpinLock`].
#[derive(Debug, Clone, Copy)]
pub struct OwnerThread;

// SAFETY: every thread draws a distinct id from a monotonic counter, and the
// id never changes for the lifetime of the thread.
unsafe impl GetThreadId for OwnerThread {
    const INIT: Self = Self;

    fn nonzero_thread_id(&self) -> NonZeroUsize {
        THREAD_ID.with(|id| *id)
    }
}

/// Spin lock that the owning thread may re-enter.
pub type ReentrantSpinLock<T> = lock_api::ReentrantMutex<RawSpinLock, OwnerThread, T>;

/// Guard returned by [`ReentrantSpinLock::lock`].
pub type ReentrantSpinGuard<'a, T> = lock_api::ReentrantMutexGuard<'a, RawSpinLock, OwnerThread, T>;

/// A value shared across threads, mutated under a [`ReentrantSpinLock`].
///
/// Usable in a `static`.
pub struct SharedCell<T> {
    lock: ReentrantSpinLock<RefCell<T>>,
}

impl<T> SharedCell<T> {
    /// Creates a cell.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            lock: lock_api::ReentrantMutex::const_new(
                RawSpinLock::INIT,
                OwnerThread,
                RefCell::new(value),
            ),
        }
    }

    /// Runs `f` with exclusive access to the value.
    ///
    /// # Panics
    ///
    /// Panics if `f` calls `with` on the same cell: the lock re-enters but
    /// the value cannot be borrowed mutably twice.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let guard = self.lock.lock();
        let mut value = guard.borrow_mut();
        f(&mut value)
    }

    /// Runs `f` with shared access to the value. Nested reads are allowed.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.lock.lock();
        let value = guard.borrow();
        f(&value)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SharedCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.read(|value| f.debug_tuple("SharedCell").field(value).finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_reentrant() {
        let lock = ReentrantSpinLock::new(5u32);
        let outer = lock.lock();
        let inner = lock.lock();
        assert_eq!(*outer + *inner, 10);
    }

    #[test]
    fn test_try_lock_from_other_thread_fails_while_held() {
        let lock = ReentrantSpinLock::new(());
        let _guard = lock.lock();
        std::thread::scope(|s| {
            let handle = s.spawn(|| lock.try_lock().is_none());
            assert!(handle.join().unwrap());
        });
    }

    #[test]
    fn test_shared_cell_counts_across_threads() {
        static CELL: SharedCell<u64> = SharedCell::new(0);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        CELL.with(|n| *n += 1);
                    }
                });
            }
        });
        assert_eq!(CELL.read(|n| *n), 4000);
    }

    #[test]
    fn test_nested_reads() {
        let cell = SharedCell::new(vec![1, 2, 3]);
        let total = cell.read(|outer| cell.read(|inner| outer.len() + inner.len()));
        assert_eq!(total, 6);
    }

    #[test]
    fn test_thread_ids_differ() {
        let here = OwnerThread.nonzero_thread_id();
        let there = std::thread::spawn(|| OwnerThread.nonzero_thread_id())
            .join()
            .unwrap();
        assert_ne!(here, there);
    }
}
