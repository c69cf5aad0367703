/*!
 * Defragmentation Tests
 * Merging carved blocks and returning pooled memory
 */

use astro_mempool::memory::{Arena, DefragMode, MemoryError};
use pretty_assertions::assert_eq;

#[test]
fn test_adjacent_slab_blocks_merge_into_one_region() {
    let mut arena = Arena::new().with_minimum_slab_size(16 * 1024).unwrap();
    let ptrs: Vec<_> = (0..6).map(|_| arena.allocate(500).unwrap()).collect();
    // Header bytes sit between each block's address and its payload
    let spans: usize = ptrs
        .iter()
        .map(|ptr| {
            let ptr = ptr.unwrap();
            let info = arena.block_info(ptr).unwrap();
            (ptr.as_ptr() as usize - info.address) + info.actual_bytes
        })
        .sum();
    for ptr in ptrs {
        arena.release(ptr).unwrap();
    }
    let remainder_before = arena.stats().slab_remainder_bytes;

    let report = arena.defragment(DefragMode::Merge).unwrap();
    assert_eq!(report.examined, 6);
    assert_eq!(report.absorbed, 5);
    assert_eq!(report.reattached, 1);

    let stats = arena.stats();
    assert_eq!(stats.pooled_blocks, 0);
    assert_eq!(stats.bytes_pooled, 0);
    assert_eq!(stats.slab_remainder_bytes, remainder_before + spans);
    assert_eq!(stats.slab_remainder_bytes, 16 * 1024);
}

#[test]
fn test_merged_region_serves_larger_request() {
    let mut arena = Arena::new().with_minimum_slab_size(16 * 1024).unwrap();
    let ptrs: Vec<_> = (0..8).map(|_| arena.allocate(1000).unwrap()).collect();
    let os_bytes = arena.os_bytes();
    for ptr in ptrs {
        arena.release(ptr).unwrap();
    }
    arena.defragment(DefragMode::Merge).unwrap();

    let big = arena.allocate(12_000).unwrap();
    assert!(big.is_some());
    assert_eq!(arena.os_bytes(), os_bytes, "merged space should satisfy the request");
}

#[test]
fn test_merge_leaves_live_blocks_alone() {
    let mut arena = Arena::new().with_minimum_slab_size(8192).unwrap();
    let a = arena.allocate(100).unwrap();
    let b = arena.allocate(100).unwrap();
    let c = arena.allocate(100).unwrap();
    arena.payload_mut(b.unwrap()).unwrap().fill(0x42);
    arena.release(a).unwrap();
    arena.release(c).unwrap();

    let report = arena.defragment(DefragMode::Merge).unwrap();
    assert_eq!(report.absorbed, 0);
    assert!(arena.payload(b.unwrap()).unwrap().iter().all(|&x| x == 0x42));
    assert_eq!(arena.check_all().unwrap(), 1);
}

#[test]
fn test_return_to_os_releases_pool() {
    let mut arena = Arena::new();
    let ptrs: Vec<_> = [64, 500, 9000, 40_000]
        .iter()
        .map(|&size| arena.allocate(size).unwrap())
        .collect();
    let held = arena.stats().os_bytes_held;
    for ptr in ptrs {
        arena.release(ptr).unwrap();
    }

    let report = arena.defragment(DefragMode::ReturnToOs).unwrap();
    assert_eq!(report.returned_bytes, held);
    let stats = arena.stats();
    assert_eq!(stats.os_bytes_held, 0);
    assert_eq!(stats.bytes_pooled, 0);
    assert_eq!(stats.defrag_runs, 1);
}

#[test]
fn test_return_to_os_illegal_with_slabs() {
    let mut arena = Arena::new().with_minimum_slab_size(4096).unwrap();
    let err = arena.defragment(DefragMode::ReturnToOs).unwrap_err();
    assert_eq!(
        err,
        MemoryError::IllegalDefragment {
            minimum_slab_size: 4096
        }
    );
}
