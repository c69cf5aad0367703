/*!
 * Arena Tests
 * Allocation, reference counting and introspection through the public API
 */

use astro_mempool::core::limits::BLOCK_ALIGN;
use astro_mempool::memory::{Arena, Disposition, MemoryError, SerialTrigger};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn counting_arena() -> (Arena, Arc<AtomicUsize>) {
    let mut arena = Arena::new();
    let inconsistencies = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&inconsistencies);
    arena.set_on_inconsistency(Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Disposition::Fatal
    }));
    (arena, inconsistencies)
}

#[test]
fn test_boundary_sizes_round_trip_cleanly() {
    let (mut arena, inconsistencies) = counting_arena();
    let sizes = [
        0, 1, 17, 63, 64, 65, 127, 128, 129, 255, 256, 257, 511, 512, 513, 1023, 1024, 1025,
        2047, 2048, 2049, 4095, 4096, 4097, 8191, 8192, 8193, 16_383, 16_384, 16_385, 100_000,
    ];

    for &size in &sizes {
        let ptr = arena.allocate(size).expect("allocation failed");
        if size == 0 {
            assert_eq!(ptr, None);
            continue;
        }
        let ptr = ptr.expect("non-zero size must yield a block");
        assert_eq!(ptr.as_ptr() as usize % BLOCK_ALIGN, 0);
        let info = arena.block_info(ptr).unwrap();
        assert_eq!(info.user_bytes, size);
        assert!(info.actual_bytes >= size);
        arena.release(Some(ptr)).expect("release failed");

        let again = arena.allocate(size).unwrap();
        assert_eq!(again, Some(ptr), "size {} should reuse its block", size);
        arena.release(again).unwrap();
    }

    assert_eq!(inconsistencies.load(Ordering::SeqCst), 0);
    assert_eq!(arena.bytes_in_use(), 0);
}

#[test]
fn test_blocks_are_disjoint() {
    let mut arena = Arena::new().with_minimum_slab_size(64 * 1024).unwrap();
    let mut spans: Vec<(usize, usize)> = (1..200)
        .map(|i| {
            let size = i * 37;
            let ptr = arena.allocate(size).unwrap().unwrap();
            (ptr.as_ptr() as usize, size)
        })
        .collect();
    spans.sort_unstable();
    for pair in spans.windows(2) {
        assert!(pair[0].0 + pair[0].1 <= pair[1].0);
    }
}

#[test]
fn test_reference_then_release_twice() {
    let mut arena = Arena::new();
    let ptr = arena.allocate(256).unwrap().unwrap();
    arena.reference(ptr).unwrap();

    arena.release(Some(ptr)).unwrap();
    assert!(arena.is_owned(ptr.as_ptr()));
    assert_eq!(arena.bytes_in_use(), 256);

    arena.release(Some(ptr)).unwrap();
    assert!(!arena.is_owned(ptr.as_ptr()));
    assert_eq!(arena.bytes_in_use(), 0);

    let err = arena.release(Some(ptr)).unwrap_err();
    assert!(matches!(err, MemoryError::DoubleRelease { .. }));
}

#[test]
fn test_counters_and_report() {
    let mut arena = Arena::new();
    let a = arena.allocate(10).unwrap();
    let b = arena.allocate(5000).unwrap();
    arena.reference(b.unwrap()).unwrap();
    arena.release(a).unwrap();

    let stats = arena.stats();
    assert_eq!(stats.serial, 2);
    assert_eq!(stats.allocate_calls, 2);
    assert_eq!(stats.release_calls, 1);
    assert_eq!(stats.reference_calls, 1);
    assert_eq!(stats.live_blocks, 1);
    assert_eq!(stats.pooled_blocks, 1);
    assert_eq!(stats.bytes_in_use, 8192);
    assert_eq!(stats.bytes_requested, 5000);
    assert!(stats.bytes_in_use + stats.bytes_pooled <= stats.os_bytes_total);

    let report = stats.to_string();
    assert!(report.contains("Arena statistics (serial 2)"));
    let json = stats.to_json().unwrap();
    assert!(json.contains("\"live_blocks\":1"));
}

#[test]
fn test_live_blocks_reports_leaks() {
    let mut arena = Arena::new();
    let kept = arena.allocate(300).unwrap();
    let freed = arena.allocate(40).unwrap();
    arena.release(freed).unwrap();

    let live = arena.live_blocks();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].serial, 1);
    assert_eq!(live[0].user_bytes, 300);
    arena.release(kept).unwrap();
}

#[test]
fn test_always_trigger_sees_every_serial() {
    let mut arena = Arena::new();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    arena.set_on_serial_threshold(
        SerialTrigger::Always,
        Box::new(move |serial, _| log.lock().push(serial)),
    );

    for size in [8, 80, 800] {
        arena.allocate(size).unwrap();
    }
    assert_eq!(*seen.lock(), vec![1, 2, 3]);

    arena.reset_hooks();
    arena.allocate(8).unwrap();
    assert_eq!(seen.lock().len(), 3);
}

#[test]
fn test_payload_views_follow_user_size() {
    let mut arena = Arena::new();
    let ptr = arena.allocate_zeroed(3, 7).unwrap().unwrap();
    assert_eq!(arena.payload(ptr).unwrap(), &[0u8; 21][..]);

    arena.payload_mut(ptr).unwrap().copy_from_slice(b"orion-nebula-frame-01");
    let moved = arena.reallocate(Some(ptr), 12).unwrap().unwrap();
    assert_eq!(arena.payload(moved).unwrap(), b"orion-nebula");
    assert!(arena.payload(ptr).is_err());
}
