//! Integration tests for type discovery and proxy dispatch.
//!
//! Everything here is registered through the discovery macros, so this
//! binary owns its own submission list.

use bytemuck::{Pod, Zeroable};
use umbra_core::types::{ProxyIndex, TypeIndex};
use umbra_core::{
    Allocator, CoreError, Implements, IndexedType, Method, Proxy, RuntimeConfig, TypeRegistry,
};

// =============================================================================
// Contracts
// =============================================================================

/// Reports which (type, ordinal) handled each call.
struct Describe;

#[derive(Debug, Default)]
struct DescribeArgs {
    calls: Vec<(&'static str, usize, u32)>,
}

impl Proxy for Describe {
    const NAME: &'static str = "Describe";
    const METHOD_COUNT: usize = 2;
    type Args = DescribeArgs;
}

/// Multiplies a value's size in place.
struct Scale;

impl Proxy for Scale {
    const NAME: &'static str = "Scale";
    const METHOD_COUNT: usize = 1;
    type Args = u32;
}

// =============================================================================
// Types
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Crate {
    size: u32,
}

impl IndexedType for Crate {
    const NAME: &'static str = "Crate";
}

impl Crate {
    fn name(&mut self, args: &mut DescribeArgs) {
        args.calls.push(("Crate", 0, self.size));
    }

    fn weight(&mut self, args: &mut DescribeArgs) {
        args.calls.push(("Crate", 1, self.size * 10));
    }

    fn scale(&mut self, factor: &mut u32) {
        self.size *= *factor;
    }
}

impl Implements<Describe> for Crate {
    fn methods() -> Vec<Method<Self, Describe>> {
        vec![Crate::name, Crate::weight]
    }
}

impl Implements<Scale> for Crate {
    fn methods() -> Vec<Method<Self, Scale>> {
        let scale: Method<Self, Scale> = Crate::scale;
        vec![scale]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Barrel {
    litres: u64,
}

impl IndexedType for Barrel {
    const NAME: &'static str = "Barrel";
}

impl Barrel {
    fn name(&mut self, args: &mut DescribeArgs) {
        args.calls.push(("Barrel", 0, self.litres as u32));
    }

    fn weight(&mut self, args: &mut DescribeArgs) {
        args.calls.push(("Barrel", 1, self.litres as u32 + 7));
    }
}

impl Implements<Describe> for Barrel {
    fn methods() -> Vec<Method<Self, Describe>> {
        vec![Barrel::name, Barrel::weight]
    }
}

/// Registered as a plain type only.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Anchor {
    depth: i32,
}

impl IndexedType for Anchor {
    const NAME: &'static str = "Anchor";
}

/// Declares the wrong number of methods; never submitted.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Broken {
    value: u32,
}

impl IndexedType for Broken {
    const NAME: &'static str = "Broken";
}

impl Implements<Describe> for Broken {
    fn methods() -> Vec<Method<Self, Describe>> {
        let noop: Method<Self, Describe> = |_, _| {};
        vec![noop]
    }
}

umbra_core::register_indexed_type!(Anchor);
umbra_core::register_proxy_impl!(Crate => Describe);
umbra_core::register_proxy_impl!(Crate => Scale);
umbra_core::register_proxy_impl!(Barrel => Describe);

fn scanned() -> TypeRegistry {
    let mut builder = TypeRegistry::builder();
    builder.scan().unwrap();
    builder.build()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_scan_assigns_indices_by_name() {
    let registry = scanned();
    assert_eq!(registry.type_count(), 3);
    assert_eq!(registry.proxy_count(), 2);
    assert_eq!(registry.delegate_count(), 5);

    assert_eq!(registry.type_index::<Anchor>().unwrap(), TypeIndex(0));
    assert_eq!(registry.type_index::<Barrel>().unwrap(), TypeIndex(1));
    assert_eq!(registry.type_index::<Crate>().unwrap(), TypeIndex(2));
    assert_eq!(registry.proxy_index::<Describe>().unwrap(), ProxyIndex(0));
    assert_eq!(registry.proxy_index::<Scale>().unwrap(), ProxyIndex(1));
}

#[test]
fn test_scan_is_repeatable_across_registries() {
    let first = scanned();
    let second = scanned();
    assert_eq!(
        first.type_index::<Crate>().unwrap(),
        second.type_index::<Crate>().unwrap()
    );
    assert_eq!(
        first.delegate_index(TypeIndex(2), ProxyIndex(1)),
        second.delegate_index(TypeIndex(2), ProxyIndex(1))
    );
}

#[test]
fn test_every_ordinal_reaches_its_implementation() {
    let registry = scanned();
    let mut allocator = Allocator::new(&RuntimeConfig::default()).unwrap();
    let zone = allocator.zone_mut();

    let crate_ptr = registry
        .proxy_ptr::<Crate, Describe>(zone.allocate_value(Crate { size: 3 }).unwrap())
        .unwrap();
    let barrel_ptr = registry
        .proxy_ptr::<Barrel, Describe>(zone.allocate_value(Barrel { litres: 40 }).unwrap())
        .unwrap();

    let mut args = DescribeArgs::default();
    for ptr in [crate_ptr, barrel_ptr] {
        for ordinal in 0..Describe::METHOD_COUNT {
            registry.invoke::<Describe>(zone, ptr, ordinal, &mut args).unwrap();
        }
    }
    assert_eq!(
        args.calls,
        vec![
            ("Crate", 0, 3),
            ("Crate", 1, 30),
            ("Barrel", 0, 40),
            ("Barrel", 1, 47)
        ]
    );
}

#[test]
fn test_one_value_through_two_contracts() {
    let registry = scanned();
    let mut allocator = Allocator::new(&RuntimeConfig::default()).unwrap();
    let zone = allocator.zone_mut();
    let data = zone.allocate_value(Crate { size: 2 }).unwrap();

    let scale = registry.proxy_ptr::<Crate, Scale>(data).unwrap();
    let describe = registry.proxy_ptr::<Crate, Describe>(data).unwrap();

    registry.invoke::<Scale>(zone, scale, 0, &mut 5).unwrap();
    assert_eq!(zone.value::<Crate>(data).unwrap().size, 10);

    // the zone may grow between creating a pointer and using it
    zone.grow(1 << 20).unwrap();
    let mut args = DescribeArgs::default();
    registry.invoke::<Describe>(zone, describe, 0, &mut args).unwrap();
    assert_eq!(args.calls, vec![("Crate", 0, 10)]);
}

#[test]
fn test_dispatch_errors() {
    let registry = scanned();
    let mut allocator = Allocator::new(&RuntimeConfig::default()).unwrap();
    let zone = allocator.zone_mut();
    let data = zone.allocate_value(Barrel { litres: 1 }).unwrap();
    let describe = registry.proxy_ptr::<Barrel, Describe>(data).unwrap();

    assert_eq!(
        registry.proxy_ptr::<Barrel, Scale>(data).unwrap_err(),
        CoreError::ProxyNotFound {
            type_index: 1,
            proxy_index: 1
        }
    );
    assert_eq!(
        registry
            .invoke::<Describe>(zone, describe, 2, &mut DescribeArgs::default())
            .unwrap_err(),
        CoreError::MethodOutOfRange {
            proxy: "Describe",
            ordinal: 2,
            count: 2
        }
    );
    assert_eq!(
        registry.invoke::<Scale>(zone, describe, 0, &mut 2).unwrap_err(),
        CoreError::ProxyMismatch {
            expected: "Scale",
            found: "Describe"
        }
    );
    assert_eq!(
        registry.type_index::<Broken>().unwrap_err(),
        CoreError::TypeNotRegistered("Broken")
    );
}

#[test]
fn test_duplicate_and_malformed_registrations() {
    let mut builder = TypeRegistry::builder();
    builder.scan().unwrap();
    assert!(matches!(
        builder.scan().err(),
        Some(CoreError::DuplicateProxy { .. })
    ));
    assert_eq!(
        builder.register_proxy::<Broken, Describe>().unwrap_err(),
        CoreError::MethodCountMismatch {
            type_name: "Broken",
            proxy: "Describe",
            expected: 2,
            found: 1
        }
    );
}
