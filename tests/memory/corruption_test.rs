/*!
 * Corruption Guard Tests
 * Overwritten headers, foreign pointers and double releases
 */

use astro_mempool::memory::{Arena, Disposition, Inconsistency, InconsistencyKind, MemoryError};
use miette::Diagnostic;
use pretty_assertions::assert_eq;
use std::ptr::NonNull;
use std::sync::Arc;

/// The poison tag is the first word of every header
unsafe fn poison_word(arena: &Arena, ptr: NonNull<u8>) -> *mut u64 {
    arena.block_info(ptr).unwrap().address as *mut u64
}

fn recording_arena() -> (Arena, Arc<parking_lot::Mutex<Vec<Inconsistency>>>) {
    let mut arena = Arena::new();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    arena.set_on_inconsistency(Box::new(move |inc| {
        log.lock().push(inc.clone());
        Disposition::Continue
    }));
    (arena, seen)
}

#[test]
fn test_overwritten_poison_reaches_handler() {
    let (mut arena, seen) = recording_arena();
    let ptr = arena.allocate(100).unwrap().unwrap();
    let word = unsafe { poison_word(&arena, ptr) };
    let original = unsafe { word.read() };

    unsafe { word.write(0xDEAD_BEEF) };
    arena.release(Some(ptr)).unwrap();

    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].kind,
            InconsistencyKind::PoisonMismatch { found: 0xDEAD_BEEF }
        );
        assert_eq!(seen[0].serial, None);
    }
    // The failed release left the block live and untouched
    assert_eq!(arena.stats().live_blocks, 1);
    assert_eq!(arena.stats().pooled_blocks, 0);

    unsafe { word.write(original) };
    arena.release(Some(ptr)).unwrap();
    assert_eq!(arena.stats().pooled_blocks, 1);
}

#[test]
fn test_overwritten_poison_is_fatal_by_default() {
    let mut arena = Arena::new();
    let ptr = arena.allocate(100).unwrap().unwrap();
    let word = unsafe { poison_word(&arena, ptr) };
    let original = unsafe { word.read() };
    unsafe { word.write(0) };

    assert!(matches!(
        arena.release(Some(ptr)),
        Err(MemoryError::Corruption {
            kind: InconsistencyKind::PoisonMismatch { found: 0 },
            ..
        })
    ));
    assert!(arena.check_all().is_err());
    assert!(!arena.is_owned(ptr.as_ptr()));

    unsafe { word.write(original) };
    assert_eq!(arena.check_all().unwrap(), 1);
}

#[test]
fn test_foreign_pointer_rejected() {
    let (mut arena, seen) = recording_arena();
    arena.allocate(64).unwrap();

    let mut foreign = vec![0u64; 64];
    let ptr = NonNull::new(foreign[32..].as_mut_ptr().cast::<u8>()).unwrap();
    assert!(!arena.is_owned(ptr.as_ptr()));
    arena.release(Some(ptr)).unwrap();
    arena.reference(ptr).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|inc| matches!(
        inc.kind,
        InconsistencyKind::Unowned | InconsistencyKind::Misaligned
    )));
}

#[test]
fn test_double_release_reported_once_per_call() {
    let (mut arena, seen) = recording_arena();
    let ptr = arena.allocate(32).unwrap();
    arena.release(ptr).unwrap();
    arena.release(ptr).unwrap();
    arena.release(ptr).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen
        .iter()
        .all(|inc| inc.kind == InconsistencyKind::DoubleRelease && inc.serial == Some(1)));
    assert_eq!(arena.stats().pooled_blocks, 1);
}

#[test]
fn test_errors_render_as_diagnostics() {
    let mut arena = Arena::new();
    let ptr = arena.allocate(32).unwrap();
    arena.release(ptr).unwrap();
    let err = arena.release(ptr).unwrap_err();

    let code = err.code().map(|code| code.to_string());
    assert_eq!(code.as_deref(), Some("memory::double_release"));
    assert!(err.help().is_some());
    assert!(err.to_string().starts_with("Double release of block"));
}
