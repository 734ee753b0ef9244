//! Property tests for the zone, entity ids and component sets.

use bytemuck::{Pod, Zeroable};
use proptest::prelude::*;
use umbra_core::ecs::{ComponentSet, EntityStatePart};
use umbra_core::memory::MAX_ZONE_BYTES;
use umbra_core::{AllocatorId, Entity, IndexedType, MemPtr, MemZone, TypeIndex};

// =============================================================================
// Zone
// =============================================================================

#[derive(Clone, Debug)]
enum ZoneOp {
    Allocate(usize),
    Free(usize),
    Reallocate(usize, usize),
}

fn zone_op() -> impl Strategy<Value = ZoneOp> {
    prop_oneof![
        3 => (1usize..1500).prop_map(ZoneOp::Allocate),
        2 => any::<usize>().prop_map(ZoneOp::Free),
        1 => (any::<usize>(), 1usize..3000).prop_map(|(i, n)| ZoneOp::Reallocate(i, n)),
    ]
}

/// A live block and the byte it was filled with.
struct Live {
    ptr: MemPtr,
    len: usize,
    fill: u8,
}

fn fill(zone: &mut MemZone, live: &Live) {
    zone.bytes_mut(live.ptr, live.len).unwrap().fill(live.fill);
}

proptest! {
    #[test]
    fn zone_sequences_keep_heap_consistent(ops in prop::collection::vec(zone_op(), 1..120)) {
        let mut zone = MemZone::new(3, AllocatorId(3), 1024, 2, MAX_ZONE_BYTES).unwrap();
        let mut live: Vec<Live> = Vec::new();
        let mut next_fill = 1u8;

        for op in ops {
            match op {
                ZoneOp::Allocate(len) => {
                    let ptr = zone.allocate(len).unwrap();
                    let block = Live { ptr, len, fill: next_fill };
                    fill(&mut zone, &block);
                    live.push(block);
                }
                ZoneOp::Free(i) if !live.is_empty() => {
                    let block = live.swap_remove(i % live.len());
                    zone.free(block.ptr).unwrap();
                    prop_assert!(!zone.is_live(block.ptr));
                }
                ZoneOp::Reallocate(i, len) if !live.is_empty() => {
                    let index = i % live.len();
                    let old = &live[index];
                    let ptr = zone.reallocate(old.ptr, len).unwrap();
                    let keep = old.len.min(len);
                    prop_assert!(zone.bytes(ptr, keep).unwrap().iter().all(|&b| b == old.fill));
                    let block = Live { ptr, len, fill: next_fill };
                    fill(&mut zone, &block);
                    live[index] = block;
                }
                _ => {}
            }
            next_fill = next_fill.wrapping_add(1).max(1);

            let heap = zone.check_heap().unwrap();
            prop_assert!(heap.used_bytes + heap.free_bytes <= zone.size());
            prop_assert_eq!(heap.used_blocks, live.len());
            for block in &live {
                prop_assert!(zone.block_capacity(block.ptr).unwrap() >= block.len);
                prop_assert!(zone.bytes(block.ptr, block.len).unwrap().iter().all(|&b| b == block.fill));
            }
        }
    }

    #[test]
    fn zone_growth_keeps_handles_valid(sizes in prop::collection::vec(8usize..512, 1..40), extra in 1usize..200_000) {
        let mut zone = MemZone::new(4, AllocatorId(4), 512, 2, MAX_ZONE_BYTES).unwrap();
        let ptrs: Vec<(MemPtr, usize)> = sizes
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                let ptr = zone.allocate(len).unwrap();
                zone.bytes_mut(ptr, len).unwrap().fill(i as u8);
                (ptr, len)
            })
            .collect();

        zone.grow(extra).unwrap();
        zone.check_heap().unwrap();
        for (i, &(ptr, len)) in ptrs.iter().enumerate() {
            prop_assert!(zone.is_live(ptr));
            prop_assert!(zone.bytes(ptr, len).unwrap().iter().all(|&b| b == i as u8));
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Clone, Debug)]
enum EntityOp {
    Create,
    Destroy(usize),
}

fn entity_op() -> impl Strategy<Value = EntityOp> {
    prop_oneof![
        3 => Just(EntityOp::Create),
        2 => any::<usize>().prop_map(EntityOp::Destroy),
    ]
}

proptest! {
    #[test]
    fn entity_liveness_follows_create_and_destroy(ops in prop::collection::vec(entity_op(), 1..200)) {
        let mut part = EntityStatePart::new(AllocatorId(5), 8);
        let mut issued: Vec<(Entity, bool)> = Vec::new();

        for op in ops {
            match op {
                EntityOp::Create => {
                    let e = part.create_entity().unwrap();
                    for &(old, _) in issued.iter().filter(|(old, _)| old.id == e.id) {
                        prop_assert!(e.generation > old.generation);
                    }
                    issued.push((e, true));
                }
                EntityOp::Destroy(i) if !issued.is_empty() => {
                    let index = i % issued.len();
                    let (e, alive) = issued[index];
                    prop_assert_eq!(part.destroy_entity(e), alive);
                    issued[index].1 = false;
                }
                EntityOp::Destroy(_) => {}
            }

            for &(e, alive) in &issued {
                prop_assert_eq!(part.is_alive(e), alive);
            }
            let mut alive_ids: Vec<u32> = issued.iter().filter(|(_, a)| *a).map(|(e, _)| e.id).collect();
            let count = alive_ids.len();
            alive_ids.sort_unstable();
            alive_ids.dedup();
            prop_assert_eq!(alive_ids.len(), count);
            prop_assert_eq!(part.alive_count(), count);
        }
    }
}

// =============================================================================
// Component sets
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Mass {
    kg: u32,
}

impl IndexedType for Mass {
    const NAME: &'static str = "Mass";
}

proptest! {
    #[test]
    fn removing_one_member_keeps_the_rest(count in 1u32..80, victim in any::<u32>(), capacity in 1u32..8) {
        let mut zone = MemZone::new(6, AllocatorId(6), 1024, 2, MAX_ZONE_BYTES).unwrap();
        let mut set = ComponentSet::<Mass>::new(&mut zone, TypeIndex(0), capacity, count).unwrap();
        let members: Vec<Entity> = (0..count).map(|id| Entity::new(id, 1, AllocatorId(6))).collect();
        for e in &members {
            set.get_or_add(&mut zone, *e).unwrap().kg = e.id * 3;
        }

        let victim = members[(victim % count) as usize];
        prop_assert!(set.remove_swap_back(&mut zone, victim).unwrap());
        prop_assert!(!set.has_element(&zone, victim));
        prop_assert_eq!(set.len(), count as usize - 1);
        for e in members.iter().filter(|e| **e != victim) {
            prop_assert_eq!(set.get(&zone, *e).unwrap().map(|m| m.kg), Some(e.id * 3));
        }
    }

    #[test]
    fn add_then_remove_restores_membership(count in 0u32..40, extra in 40u32..60) {
        let mut zone = MemZone::new(7, AllocatorId(7), 1024, 2, MAX_ZONE_BYTES).unwrap();
        let mut set = ComponentSet::<Mass>::new(&mut zone, TypeIndex(0), 4, 64).unwrap();
        for id in 0..count {
            set.get_or_add(&mut zone, Entity::new(id, 1, AllocatorId(7))).unwrap();
        }
        let e = Entity::new(extra, 1, AllocatorId(7));
        set.get_or_add(&mut zone, e).unwrap();
        let before = set.len();

        prop_assert!(set.remove_swap_back(&mut zone, e).unwrap());
        prop_assert!(!set.has_element(&zone, e));
        prop_assert_eq!(set.len(), before - 1);
    }
}
