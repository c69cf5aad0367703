/*!
 * Memory Traits
 * Underlying allocator abstraction
 */

use crate::core::limits::BLOCK_ALIGN;
use crate::core::types::Size;
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use tracing::warn;

/// Source of coarse regions for an arena
///
/// Every region handed out is `BLOCK_ALIGN`-aligned and fully initialised,
/// since the guard reads candidate headers anywhere inside a held region.
/// The arena gives each region back exactly once, with the size it was
/// obtained with.
pub trait SystemSource: Send {
    /// Obtain `size` bytes, or `None` when the source is exhausted
    fn obtain(&mut self, size: Size) -> Option<NonNull<u8>>;

    /// Return a region previously obtained from this source
    ///
    /// # Safety
    ///
    /// `ptr` and `size` must describe a region returned by `obtain` on this
    /// source that has not been given back yet.
    unsafe fn give_back(&mut self, ptr: NonNull<u8>, size: Size);
}

/// Regions from the process heap via `std::alloc`
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapSource;

impl HeapSource {
    fn layout(size: Size) -> Option<Layout> {
        Layout::from_size_align(size.max(1), BLOCK_ALIGN).ok()
    }
}

impl SystemSource for HeapSource {
    fn obtain(&mut self, size: Size) -> Option<NonNull<u8>> {
        let layout = Self::layout(size)?;
        // SAFETY: layout has non-zero size
        NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
    }

    unsafe fn give_back(&mut self, ptr: NonNull<u8>, size: Size) {
        match Self::layout(size) {
            // SAFETY: caller guarantees ptr came from obtain(size)
            Some(layout) => alloc::dealloc(ptr.as_ptr(), layout),
            None => warn!(size, "refusing to give back region with invalid layout"),
        }
    }
}

/// Wraps another source and refuses requests past a byte budget
///
/// Useful for bounding an arena the way a batch job bounds its working set.
#[derive(Debug)]
pub struct CappedSource<S> {
    inner: S,
    capacity: Size,
    held: Size,
}

impl<S: SystemSource> CappedSource<S> {
    pub fn new(inner: S, capacity: Size) -> Self {
        Self {
            inner,
            capacity,
            held: 0,
        }
    }

    /// Bytes currently held from the inner source
    pub fn held(&self) -> Size {
        self.held
    }

    pub fn capacity(&self) -> Size {
        self.capacity
    }
}

impl<S: SystemSource> SystemSource for CappedSource<S> {
    fn obtain(&mut self, size: Size) -> Option<NonNull<u8>> {
        if self.held.checked_add(size)? > self.capacity {
            return None;
        }
        let ptr = self.inner.obtain(size)?;
        self.held += size;
        Some(ptr)
    }

    unsafe fn give_back(&mut self, ptr: NonNull<u8>, size: Size) {
        self.held = self.held.saturating_sub(size);
        self.inner.give_back(ptr, size);
    }
}
