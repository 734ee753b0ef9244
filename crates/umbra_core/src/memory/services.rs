//! # Local Services
//!
//! Per-allocator singletons keyed by their Rust type. A service may own
//! blocks in the zone; it gets the zone back when it is disposed.

use std::any::{Any, TypeId};

use super::zone::MemZone;

/// A singleton attached to one allocator.
pub trait LocalService: Any {
    /// Releases whatever the service holds in the zone.
    ///
    /// Called once, when the owning allocator is disposed.
    fn dispose(&mut self, zone: &mut MemZone) {
        let _ = zone;
    }
}

struct ServiceEntry {
    type_id: TypeId,
    name: &'static str,
    value: Box<dyn Any>,
    dispose: fn(&mut dyn Any, &mut MemZone),
}

/// Type-keyed registry of [`LocalService`]s.
///
/// Services are disposed in reverse insertion order.
#[derive(Default)]
pub struct LocalServices {
    entries: Vec<ServiceEntry>,
}

impl LocalServices {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a service, returning the one it replaces.
    ///
    /// A replaced service is handed back undisposed.
    pub fn insert<S: LocalService>(&mut self, service: S) -> Option<S> {
        let old = self.remove::<S>();
        self.entries.push(ServiceEntry {
            type_id: TypeId::of::<S>(),
            name: std::any::type_name::<S>(),
            value: Box::new(service),
            dispose: dispose_erased::<S>,
        });
        old
    }

    /// Returns a service.
    #[must_use]
    pub fn get<S: LocalService>(&self) -> Option<&S> {
        self.position::<S>()
            .and_then(|i| self.entries[i].value.downcast_ref::<S>())
    }

    /// Returns a service mutably.
    #[must_use]
    pub fn get_mut<S: LocalService>(&mut self) -> Option<&mut S> {
        let index = self.position::<S>()?;
        self.entries[index].value.downcast_mut::<S>()
    }

    /// Returns a service, inserting the one built by `make` if absent.
    pub fn get_or_insert_with<S: LocalService>(&mut self, make: impl FnOnce() -> S) -> &mut S {
        if !self.contains::<S>() {
            self.insert(make());
        }
        match self.get_mut::<S>() {
            Some(service) => service,
            None => unreachable!("service entry keyed by a foreign TypeId"),
        }
    }

    /// Removes a service without disposing it.
    pub fn remove<S: LocalService>(&mut self) -> Option<S> {
        let index = self.position::<S>()?;
        let entry = self.entries.remove(index);
        entry.value.downcast::<S>().ok().map(|boxed| *boxed)
    }

    /// Returns `true` if a service of type `S` is present.
    #[must_use]
    pub fn contains<S: LocalService>(&self) -> bool {
        self.position::<S>().is_some()
    }

    /// Number of services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no service is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Disposes and drops every service, newest first.
    pub fn dispose_all(&mut self, zone: &mut MemZone) {
        while let Some(mut entry) = self.entries.pop() {
            tracing::trace!(service = entry.name, "disposing local service");
            (entry.dispose)(entry.value.as_mut(), zone);
        }
    }

    fn position<S: LocalService>(&self) -> Option<usize> {
        let wanted = TypeId::of::<S>();
        self.entries.iter().position(|e| e.type_id == wanted)
    }
}

impl std::fmt::Debug for LocalServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.name))
            .finish()
    }
}

fn dispose_erased<S: LocalService>(value: &mut dyn Any, zone: &mut MemZone) {
    if let Some(service) = value.downcast_mut::<S>() {
        service.dispose(zone);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AllocatorId, MemPtr, MAX_ZONE_BYTES};

    struct Scratch {
        block: MemPtr,
        log: std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>,
    }

    impl LocalService for Scratch {
        fn dispose(&mut self, zone: &mut MemZone) {
            zone.free(self.block).unwrap();
            self.log.borrow_mut().push("scratch");
        }
    }

    struct Counter(u32);

    impl LocalService for Counter {}

    struct Tagged(std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>);

    impl LocalService for Tagged {
        fn dispose(&mut self, _zone: &mut MemZone) {
            self.0.borrow_mut().push("tagged");
        }
    }

    fn zone() -> MemZone {
        MemZone::new(9, AllocatorId(9), 1024, 2, MAX_ZONE_BYTES).unwrap()
    }

    #[test]
    fn test_insert_get_remove() {
        let mut services = LocalServices::new();
        assert!(services.insert(Counter(1)).is_none());
        assert_eq!(services.get::<Counter>().map(|c| c.0), Some(1));
        services.get_mut::<Counter>().unwrap().0 = 4;
        let old = services.insert(Counter(7)).unwrap();
        assert_eq!(old.0, 4);
        assert_eq!(services.len(), 1);
        assert_eq!(services.remove::<Counter>().map(|c| c.0), Some(7));
        assert!(!services.contains::<Counter>());
    }

    #[test]
    fn test_get_or_insert_with_builds_once() {
        let mut services = LocalServices::new();
        services.get_or_insert_with(|| Counter(0)).0 += 1;
        services.get_or_insert_with(|| Counter(100)).0 += 1;
        assert_eq!(services.get::<Counter>().unwrap().0, 2);
    }

    #[test]
    fn test_dispose_in_reverse_order_frees_blocks() {
        let mut zone = zone();
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let block = zone.allocate(64).unwrap();

        let mut services = LocalServices::new();
        services.insert(Scratch {
            block,
            log: log.clone(),
        });
        services.insert(Tagged(log.clone()));
        services.dispose_all(&mut zone);

        assert!(services.is_empty());
        assert_eq!(*log.borrow(), vec!["tagged", "scratch"]);
        assert_eq!(zone.check_heap().unwrap().used_blocks, 0);
    }
}
