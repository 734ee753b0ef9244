//! # Zone Allocator Benchmark
//!
//! Allocation churn, growth and component access through the zone.
//!
//! Run with: `cargo bench --package umbra_core --bench zone_benchmark`

// Benchmarks don't need docs
#![allow(missing_docs)]

use bytemuck::{Pod, Zeroable};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use umbra_core::ecs::ComponentSet;
use umbra_core::{AllocatorId, Entity, IndexedType, MemPtr, MemZone, RuntimeConfig, TypeIndex};

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

impl IndexedType for Velocity {
    const NAME: &'static str = "Velocity";
}

fn zone() -> MemZone {
    MemZone::with_config(1, AllocatorId(1), &RuntimeConfig::default()).unwrap()
}

/// Benchmark: allocate then free blocks of mixed sizes.
fn bench_alloc_free_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("zone_alloc_free");

    for count in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut zone = zone();
            let mut ptrs: Vec<MemPtr> = Vec::with_capacity(count);
            b.iter(|| {
                for i in 0..count {
                    ptrs.push(zone.allocate(16 + (i % 7) * 24).unwrap());
                }
                // free every other block first to force coalescing work
                for ptr in ptrs.iter().step_by(2) {
                    zone.free(*ptr).unwrap();
                }
                for ptr in ptrs.iter().skip(1).step_by(2) {
                    zone.free(*ptr).unwrap();
                }
                ptrs.clear();
                black_box(zone.stats())
            });
        });
    }

    group.finish();
}

/// Benchmark: grow a fresh zone to hold many blocks.
fn bench_growth(c: &mut Criterion) {
    c.bench_function("zone_growth_10k_blocks", |b| {
        b.iter(|| {
            let mut zone = zone();
            for _ in 0..10_000 {
                black_box(zone.allocate(48).unwrap());
            }
            zone.stats().grow_count
        });
    });
}

/// Benchmark: dense update through a component set.
fn bench_component_scan(c: &mut Criterion) {
    const COUNT: u32 = 100_000;

    let mut zone = zone();
    let mut set = ComponentSet::<Velocity>::new(&mut zone, TypeIndex(0), 16, COUNT).unwrap();
    for id in 0..COUNT {
        set.get_or_add(&mut zone, Entity::new(id, 1, AllocatorId(1)))
            .unwrap()
            .x = 1.0;
    }

    c.bench_function("component_scan_100k", |b| {
        b.iter(|| {
            for v in set.values_mut(&mut zone).unwrap() {
                v.y += v.x * 0.016;
            }
            black_box(set.len())
        });
    });

    c.bench_function("component_lookup_100k", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for id in (0..COUNT).step_by(7) {
                let e = Entity::new(id, 1, AllocatorId(1));
                sum += set.get(&zone, e).unwrap().map_or(0.0, |v| v.x);
            }
            black_box(sum)
        });
    });
}

criterion_group!(benches, bench_alloc_free_churn, bench_growth, bench_component_scan);

criterion_main!(benches);
