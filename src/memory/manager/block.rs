/*!
 * Block Headers
 * In-band metadata stored immediately before every payload
 *
 * This is the only module that dereferences header memory. A `BlockRef`
 * may only be built over memory the owning arena obtained from its
 * `SystemSource`; every other module goes through its accessors.
 */

use crate::core::limits::POISON_TAG;
use crate::core::types::{Address, Serial, Size};
use crate::memory::types::BlockInfo;
use std::ptr::{self, NonNull};

/// Header layout
///
/// `payload` is non-null while the block is live and null once released.
/// `amp_*` links thread the allocated list; `fmp_next` threads a free bucket.
#[repr(C, align(16))]
#[derive(Debug)]
pub(crate) struct BlockHeader {
    pub(crate) poison: u64,
    pub(crate) serial: Serial,
    pub(crate) user_bytes: Size,
    pub(crate) actual_bytes: Size,
    pub(crate) ref_count: usize,
    pub(crate) payload: *mut u8,
    pub(crate) amp_next: *mut BlockHeader,
    pub(crate) amp_prev: *mut BlockHeader,
    pub(crate) fmp_next: *mut BlockHeader,
}

/// Bytes occupied by a header; payloads start this far past the header
pub(crate) const HEADER_SIZE: Size = std::mem::size_of::<BlockHeader>();

/// Handle to a header inside arena-owned memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockRef(NonNull<BlockHeader>);

impl BlockRef {
    /// View the header at `addr`
    ///
    /// # Safety
    ///
    /// `addr` must be header-aligned and lie in arena-owned memory with at
    /// least `HEADER_SIZE` bytes before the end of its region.
    #[inline]
    pub(crate) unsafe fn at(addr: Address) -> Option<Self> {
        NonNull::new(addr as *mut BlockHeader).map(Self)
    }

    /// Write a fresh header at `base` and return a handle to it
    ///
    /// # Safety
    ///
    /// `base` must be header-aligned with `HEADER_SIZE + actual_bytes`
    /// arena-owned bytes behind it.
    pub(crate) unsafe fn stamp(
        base: NonNull<u8>,
        serial: Serial,
        user_bytes: Size,
        actual_bytes: Size,
    ) -> Self {
        let header = base.cast::<BlockHeader>();
        header.as_ptr().write(BlockHeader {
            poison: POISON_TAG,
            serial,
            user_bytes,
            actual_bytes,
            ref_count: 0,
            payload: base.as_ptr().add(HEADER_SIZE),
            amp_next: ptr::null_mut(),
            amp_prev: ptr::null_mut(),
            fmp_next: ptr::null_mut(),
        });
        Self(header)
    }

    #[inline]
    pub(crate) fn from_link(link: *mut BlockHeader) -> Option<Self> {
        NonNull::new(link).map(Self)
    }

    #[inline]
    pub(crate) fn as_link(self) -> *mut BlockHeader {
        self.0.as_ptr()
    }

    /// Start of the block, header included
    #[inline]
    pub(crate) fn base(self) -> NonNull<u8> {
        self.0.cast()
    }

    #[inline]
    pub(crate) fn addr(self) -> Address {
        self.0.as_ptr() as Address
    }

    /// First address past this block's usable bytes
    #[inline]
    pub(crate) fn end(self) -> Address {
        self.addr() + HEADER_SIZE + self.header().actual_bytes
    }

    /// Bytes this block covers, header included
    #[inline]
    pub(crate) fn span(self) -> Size {
        HEADER_SIZE + self.header().actual_bytes
    }

    #[inline]
    pub(crate) fn header<'a>(self) -> &'a BlockHeader {
        // SAFETY: type invariant, the arena is single-threaded and never
        // holds two header borrows across a mutation
        unsafe { &*self.0.as_ptr() }
    }

    #[inline]
    pub(crate) fn header_mut<'a>(self) -> &'a mut BlockHeader {
        // SAFETY: see `header`
        unsafe { &mut *self.0.as_ptr() }
    }

    /// Payload address, whether or not the block is live
    #[inline]
    pub(crate) fn payload_ptr(self) -> NonNull<u8> {
        // SAFETY: the payload follows the header inside the same region
        unsafe { NonNull::new_unchecked(self.0.as_ptr().cast::<u8>().add(HEADER_SIZE)) }
    }

    #[inline]
    pub(crate) fn is_live(self) -> bool {
        !self.header().payload.is_null()
    }

    pub(crate) fn info(self) -> BlockInfo {
        let header = self.header();
        BlockInfo {
            address: self.addr(),
            serial: header.serial,
            user_bytes: header.user_bytes,
            actual_bytes: header.actual_bytes,
            ref_count: header.ref_count,
        }
    }

    /// The first `len` payload bytes
    pub(crate) fn payload<'a>(self, len: Size) -> &'a [u8] {
        debug_assert!(len <= self.header().actual_bytes);
        // SAFETY: payload has actual_bytes arena-owned bytes
        unsafe { std::slice::from_raw_parts(self.payload_ptr().as_ptr(), len) }
    }

    pub(crate) fn payload_mut<'a>(self, len: Size) -> &'a mut [u8] {
        debug_assert!(len <= self.header().actual_bytes);
        // SAFETY: see `payload`
        unsafe { std::slice::from_raw_parts_mut(self.payload_ptr().as_ptr(), len) }
    }

    /// Copy `len` payload bytes from `src` into this block
    pub(crate) fn copy_payload_from(self, src: BlockRef, len: Size) {
        debug_assert!(len <= src.header().actual_bytes);
        debug_assert!(len <= self.header().actual_bytes);
        // SAFETY: distinct live blocks never overlap
        unsafe {
            ptr::copy_nonoverlapping(
                src.payload_ptr().as_ptr(),
                self.payload_ptr().as_ptr(),
                len,
            )
        }
    }

    /// Zero the header so stale pointers into it fail the poison check
    pub(crate) fn wipe(self) {
        // SAFETY: header bytes are arena-owned
        unsafe { ptr::write_bytes(self.0.as_ptr().cast::<u8>(), 0, HEADER_SIZE) }
    }
}
