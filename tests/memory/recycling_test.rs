/*!
 * Block Recycling Test
 * Verifies that released blocks are reused by size class
 */

use astro_mempool::memory::Arena;
use pretty_assertions::assert_eq;

#[test]
fn test_fixed_bucket_lifo_reuse() {
    let mut arena = Arena::new();

    let ptr1 = arena.allocate(100).expect("allocate 1").unwrap();
    let info = arena.block_info(ptr1).unwrap();
    assert_eq!(info.user_bytes, 100);
    assert_eq!(info.actual_bytes, 128);

    let ptr2 = arena.allocate(100).expect("allocate 2").unwrap();
    assert_ne!(ptr1, ptr2, "live blocks must be distinct");

    arena.release(Some(ptr1)).expect("release 1");
    let ptr3 = arena.allocate(100).expect("allocate 3").unwrap();
    assert_eq!(ptr3, ptr1, "128-byte bucket should hand back the last freed block");
}

#[test]
fn test_same_bucket_different_sizes() {
    let mut arena = Arena::new();
    let small = arena.allocate(65).unwrap();
    arena.release(small).unwrap();

    // 65 and 128 share the 128-byte class
    let reused = arena.allocate(128).unwrap();
    assert_eq!(reused, small);
    assert_eq!(arena.block_info(reused.unwrap()).unwrap().user_bytes, 128);
}

#[test]
fn test_catchall_prefers_smallest_leftover() {
    let mut arena = Arena::new();
    let blocks: Vec<_> = [10_000, 20_000, 15_000]
        .iter()
        .map(|&size| arena.allocate(size).unwrap())
        .collect();
    for &ptr in &blocks {
        arena.release(ptr).unwrap();
    }

    let ptr = arena.allocate(14_000).unwrap();
    assert_eq!(ptr, blocks[2], "15000-byte block is the best fit, not 20000");

    // The 10000 block is too small and the 20000 block is the only fit left
    let next = arena.allocate(14_000).unwrap();
    assert_eq!(next, blocks[1]);
}

#[test]
fn test_catchall_exact_fit() {
    let mut arena = Arena::new();
    let big = arena.allocate(30_000).unwrap();
    let exact = arena.allocate(12_000).unwrap();
    arena.release(big).unwrap();
    arena.release(exact).unwrap();

    assert_eq!(arena.allocate(12_000).unwrap(), exact);
}

#[test]
fn test_classes_do_not_mix() {
    let mut arena = Arena::new();
    let small = arena.allocate(64).unwrap();
    arena.release(small).unwrap();

    let larger = arena.allocate(200).unwrap();
    assert_ne!(larger, small);
    assert_eq!(arena.stats().pooled_blocks, 1);
}
