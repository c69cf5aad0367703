/*!
 * Property Tests
 * Random allocate / reference / release sequences keep the arena balanced
 */

use astro_mempool::core::limits::BLOCK_ALIGN;
use astro_mempool::memory::{Arena, DefragMode};
use proptest::prelude::*;
use std::ptr::NonNull;

#[derive(Debug, Clone)]
enum Op {
    Allocate(usize),
    Reference(usize),
    Release(usize),
    Merge,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => prop_oneof![1usize..=512, 513usize..=8191, 8192usize..=40_000].prop_map(Op::Allocate),
        1 => any::<usize>().prop_map(Op::Reference),
        3 => any::<usize>().prop_map(Op::Release),
        1 => Just(Op::Merge),
    ]
}

/// Live block plus the releases it still needs
struct Held {
    ptr: NonNull<u8>,
    releases: usize,
}

fn run(arena: &mut Arena, ops: &[Op]) -> Result<(), TestCaseError> {
    let mut held: Vec<Held> = Vec::new();
    for op in ops {
        match *op {
            Op::Allocate(size) => {
                let ptr = arena.allocate(size).unwrap().unwrap();
                prop_assert_eq!(ptr.as_ptr() as usize % BLOCK_ALIGN, 0);
                held.push(Held { ptr, releases: 1 });
            }
            Op::Reference(pick) if !held.is_empty() => {
                let index = pick % held.len();
                arena.reference(held[index].ptr).unwrap();
                held[index].releases += 1;
            }
            Op::Release(pick) if !held.is_empty() => {
                let index = pick % held.len();
                arena.release(Some(held[index].ptr)).unwrap();
                held[index].releases -= 1;
                if held[index].releases == 0 {
                    held.swap_remove(index);
                }
            }
            Op::Merge => {
                arena.defragment(DefragMode::Merge).unwrap();
            }
            _ => {}
        }
        let stats = arena.stats();
        prop_assert_eq!(stats.live_blocks, held.len());
        prop_assert!(stats.bytes_in_use + stats.bytes_pooled <= stats.os_bytes_total);
    }

    for block in held {
        for _ in 0..block.releases {
            arena.release(Some(block.ptr)).unwrap();
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_balanced_sequences_restore_bytes_in_use(
        ops in prop::collection::vec(op(), 1..120),
        slab in prop_oneof![Just(0usize), Just(64 * 1024)],
    ) {
        let mut arena = Arena::new().with_minimum_slab_size(slab).unwrap();
        arena.set_on_inconsistency(Box::new(|inc| panic!("unexpected inconsistency: {:?}", inc)));
        let before = arena.bytes_in_use();

        run(&mut arena, &ops)?;

        prop_assert_eq!(arena.bytes_in_use(), before);
        prop_assert_eq!(arena.stats().live_blocks, 0);
        prop_assert_eq!(arena.check_all().unwrap(), 0);
    }
}
