//! # Allocator
//!
//! Owns one zone, a process-unique id and the per-allocator services.
//!
//! Ids come from a global pool behind a [`SharedCell`]; they are recycled
//! when an allocator is disposed and `0` is never issued, so a zeroed
//! handle or entity can never name a live allocator.

use tracing::debug;

use super::handle::AllocatorId;
use super::services::LocalServices;
use super::zone::MemZone;
use crate::config::RuntimeConfig;
use crate::error::{CoreError, CoreResult};
use crate::sync::SharedCell;

/// Allocator id bookkeeping.
struct IdPool {
    /// Next never-issued id.
    next: u32,
    /// Released ids waiting for reuse.
    free: Vec<u16>,
    /// Liveness per id.
    live: Vec<bool>,
}

impl IdPool {
    const fn new() -> Self {
        Self {
            next: 1,
            free: Vec::new(),
            live: Vec::new(),
        }
    }

    fn acquire(&mut self) -> CoreResult<AllocatorId> {
        let raw = match self.free.pop() {
            Some(raw) => raw,
            None => {
                let raw = u16::try_from(self.next).map_err(|_| CoreError::AllocatorIdsExhausted)?;
                self.next += 1;
                raw
            }
        };
        let slot = usize::from(raw);
        if self.live.len() <= slot {
            self.live.resize(slot + 1, false);
        }
        self.live[slot] = true;
        Ok(AllocatorId(raw))
    }

    fn release(&mut self, id: AllocatorId) {
        let slot = usize::from(id.raw());
        if self.live.get(slot).copied().unwrap_or(false) {
            self.live[slot] = false;
            self.free.push(id.raw());
        }
    }

    fn is_live(&self, id: AllocatorId) -> bool {
        self.live.get(usize::from(id.raw())).copied().unwrap_or(false)
    }

    fn live_count(&self) -> usize {
        self.live.iter().filter(|&&live| live).count()
    }
}

static ALLOCATOR_IDS: SharedCell<IdPool> = SharedCell::new(IdPool::new());

/// A zone plus its id and services.
///
/// Dropping an allocator disposes its services (newest first) and then
/// releases its id.
#[derive(Debug)]
pub struct Allocator {
    id: AllocatorId,
    zone: MemZone,
    services: LocalServices,
    disposed: bool,
}

impl Allocator {
    /// Creates an allocator with a fresh id and a zone sized by `config`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidConfig`] if `config` fails validation
    /// - [`CoreError::AllocatorIdsExhausted`] if every id is live
    pub fn new(config: &RuntimeConfig) -> CoreResult<Self> {
        config.validate()?;
        let id = ALLOCATOR_IDS.with(IdPool::acquire)?;
        let zone = match MemZone::with_config(id.raw(), id, config) {
            Ok(zone) => zone,
            Err(err) => {
                ALLOCATOR_IDS.with(|pool| pool.release(id));
                return Err(err);
            }
        };
        debug!(allocator = id.raw(), bytes = zone.size(), "allocator created");
        Ok(Self {
            id,
            zone,
            services: LocalServices::new(),
            disposed: false,
        })
    }

    /// Returns this allocator's id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> AllocatorId {
        self.id
    }

    /// Returns the zone.
    #[inline]
    #[must_use]
    pub const fn zone(&self) -> &MemZone {
        &self.zone
    }

    /// Returns the zone mutably.
    #[inline]
    pub fn zone_mut(&mut self) -> &mut MemZone {
        &mut self.zone
    }

    /// Returns the services.
    #[inline]
    #[must_use]
    pub const fn services(&self) -> &LocalServices {
        &self.services
    }

    /// Returns the services mutably.
    #[inline]
    pub fn services_mut(&mut self) -> &mut LocalServices {
        &mut self.services
    }

    /// Borrows the zone and the services at the same time.
    #[inline]
    pub fn split_mut(&mut self) -> (&mut MemZone, &mut LocalServices) {
        (&mut self.zone, &mut self.services)
    }

    /// Returns `true` if `id` belongs to a live allocator.
    #[must_use]
    pub fn is_live(id: AllocatorId) -> bool {
        ALLOCATOR_IDS.read(|pool| pool.is_live(id))
    }

    /// Number of live allocators in the process.
    #[must_use]
    pub fn live_count() -> usize {
        ALLOCATOR_IDS.read(IdPool::live_count)
    }

    /// Disposes services and releases the id.
    pub fn dispose(mut self) {
        self.dispose_in_place();
    }

    fn dispose_in_place(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.services.dispose_all(&mut self.zone);
        ALLOCATOR_IDS.with(|pool| pool.release(self.id));
        debug!(allocator = self.id.raw(), "allocator disposed");
    }
}

impl Drop for Allocator {
    fn drop(&mut self) {
        self.dispose_in_place();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{LocalService, MemPtr};

    #[test]
    fn test_ids_are_non_zero_and_unique() {
        let config = RuntimeConfig::default();
        let a = Allocator::new(&config).unwrap();
        let b = Allocator::new(&config).unwrap();
        assert!(a.id().is_some());
        assert_ne!(a.id(), b.id());
        assert!(Allocator::is_live(a.id()));
        assert!(!Allocator::is_live(AllocatorId::NONE));
    }

    #[test]
    fn test_id_pool_recycles_released_ids() {
        let mut pool = IdPool::new();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!((a, b), (AllocatorId(1), AllocatorId(2)));
        pool.release(a);
        pool.release(a);
        assert!(!pool.is_live(a));
        assert_eq!(pool.acquire().unwrap(), a);
        assert_eq!(pool.live_count(), 2);
    }

    #[test]
    fn test_id_pool_exhaustion() {
        let mut pool = IdPool::new();
        pool.next = u32::from(u16::MAX);
        assert_eq!(pool.acquire().unwrap(), AllocatorId(u16::MAX));
        assert_eq!(pool.acquire(), Err(CoreError::AllocatorIdsExhausted));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RuntimeConfig {
            entity_expand_step: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            Allocator::new(&config),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_handles_carry_allocator_id() {
        let mut allocator = Allocator::new(&RuntimeConfig::default()).unwrap();
        let ptr = allocator.zone_mut().allocate(24).unwrap();
        assert_eq!(ptr.allocator_id(), allocator.id());
    }

    struct Held(MemPtr);

    impl LocalService for Held {
        fn dispose(&mut self, zone: &mut MemZone) {
            zone.free(self.0).unwrap();
        }
    }

    #[test]
    fn test_drop_disposes_services() {
        let mut allocator = Allocator::new(&RuntimeConfig::default()).unwrap();
        let (zone, services) = allocator.split_mut();
        let block = zone.allocate(128).unwrap();
        services.insert(Held(block));
        allocator.dispose_in_place();
        assert!(allocator.services().is_empty());
        assert_eq!(allocator.zone().check_heap().unwrap().used_blocks, 0);
    }
}
