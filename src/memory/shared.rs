/*!
 * Shared Arena
 * One arena behind a mutex for multi-threaded pipelines
 *
 * Payload pointers are raw and not `Send`; threads that share an arena
 * should keep each block inside the closure passed to [`SharedArena::with`]
 * or hand pointers around as addresses under their own synchronisation.
 */

use super::manager::Arena;
use super::types::{DefragMode, DefragReport, MemoryResult, MemoryStats};
use crate::core::types::Size;
use parking_lot::{Mutex, MutexGuard};
use std::ptr::NonNull;
use std::sync::Arc;

/// Cloneable handle to one arena
#[derive(Clone, Default)]
pub struct SharedArena {
    inner: Arc<Mutex<Arena>>,
}

impl SharedArena {
    pub fn new(arena: Arena) -> Self {
        Self {
            inner: Arc::new(Mutex::new(arena)),
        }
    }

    /// Run `f` with exclusive access to the arena
    pub fn with<R>(&self, f: impl FnOnce(&mut Arena) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn lock(&self) -> MutexGuard<'_, Arena> {
        self.inner.lock()
    }

    pub fn allocate(&self, size: Size) -> MemoryResult<Option<NonNull<u8>>> {
        self.inner.lock().allocate(size)
    }

    pub fn release(&self, ptr: Option<NonNull<u8>>) -> MemoryResult<()> {
        self.inner.lock().release(ptr)
    }

    pub fn reference(&self, ptr: NonNull<u8>) -> MemoryResult<()> {
        self.inner.lock().reference(ptr)
    }

    pub fn defragment(&self, mode: DefragMode) -> MemoryResult<DefragReport> {
        self.inner.lock().defragment(mode)
    }

    pub fn stats(&self) -> MemoryStats {
        self.inner.lock().stats()
    }
}

impl From<Arena> for SharedArena {
    fn from(arena: Arena) -> Self {
        Self::new(arena)
    }
}
