/*!
 * Allocator Core
 * Allocation, release and reference counting
 */

use super::block::{BlockRef, HEADER_SIZE};
use super::hooks::EmptyPoolAction;
use super::Arena;
use crate::core::limits::{
    ABSURD_SIZE_BIT, BLOCK_ALIGN, CATCHALL_INDEX, DEFRAG_POOL_FACTOR, MIN_BUCKET,
};
use crate::core::types::{align_up, Address, Size};
use crate::memory::size_class::{bucket_index_for, round_up};
use crate::memory::types::{
    BlockInfo, Inconsistency, InconsistencyKind, MemoryError, MemoryResult,
};
use std::ptr::{self, NonNull};
use tracing::{debug, error, warn};

impl Arena {
    /// Allocate `size` bytes
    ///
    /// Returns `Ok(None)` for zero-byte requests. The payload is
    /// `BLOCK_ALIGN`-aligned and starts with a reference count of zero.
    pub fn allocate(&mut self, size: Size) -> MemoryResult<Option<NonNull<u8>>> {
        Ok(self.allocate_block(size)?.map(BlockRef::payload_ptr))
    }

    /// Allocate `count * elem_size` bytes, zero-filled
    pub fn allocate_zeroed(
        &mut self,
        count: Size,
        elem_size: Size,
    ) -> MemoryResult<Option<NonNull<u8>>> {
        let Some(size) = count.checked_mul(elem_size) else {
            error!(count, elem_size, "zeroed allocation size overflows");
            return Err(MemoryError::AbsurdSize {
                requested: count.saturating_mul(elem_size),
            });
        };
        let block = self.allocate_block(size)?;
        Ok(block.map(|block| {
            block.payload_mut(size).fill(0);
            block.payload_ptr()
        }))
    }

    /// Move a block's contents into a fresh block of `size` bytes
    ///
    /// Never resizes in place: the old payload is copied up to the smaller
    /// of both sizes and then released. `None` allocates, zero releases.
    pub fn reallocate(
        &mut self,
        ptr: Option<NonNull<u8>>,
        size: Size,
    ) -> MemoryResult<Option<NonNull<u8>>> {
        let Some(old) = ptr else {
            return self.allocate(size);
        };
        if size == 0 {
            self.release(Some(old))?;
            return Ok(None);
        }

        let source = match self.probe_live(old) {
            Ok(block) => block,
            Err(inconsistency) => {
                self.report(inconsistency)?;
                return Ok(None);
            }
        };
        let Some(fresh) = self.allocate_block(size)? else {
            return Ok(None);
        };
        fresh.copy_payload_from(source, source.header().user_bytes.min(size));
        self.release(Some(old))?;
        Ok(Some(fresh.payload_ptr()))
    }

    /// Drop one reference to a block, freeing it when none remain
    ///
    /// Releasing `None` is a no-op.
    pub fn release(&mut self, ptr: Option<NonNull<u8>>) -> MemoryResult<()> {
        let Some(ptr) = ptr else {
            return Ok(());
        };
        self.tracking.release_calls += 1;

        let block = match self.locate(ptr) {
            Ok(block) => block,
            Err(inconsistency) => return self.report(inconsistency),
        };
        let info = block.info();
        self.hooks.free_of_serial(&info);

        if !block.is_live() {
            return self.report(Inconsistency::new(
                info.address,
                Some(info.serial),
                InconsistencyKind::DoubleRelease,
            ));
        }

        let header = block.header_mut();
        if header.ref_count > 0 {
            header.ref_count -= 1;
            debug!(
                serial = info.serial,
                ref_count = header.ref_count,
                "dropped block reference"
            );
            return Ok(());
        }

        self.amp_unlink(block);
        block.header_mut().payload = ptr::null_mut();
        self.tracking.remove_block(info.actual_bytes, info.user_bytes);
        self.free.push(bucket_index_for(round_up(info.user_bytes)), block);
        debug!(
            serial = info.serial,
            address = format_args!("0x{:x}", info.address),
            actual_bytes = info.actual_bytes,
            "released block"
        );
        Ok(())
    }

    /// Same as [`Arena::release`]; pairs with [`Arena::reference`]
    #[inline]
    pub fn unreference(&mut self, ptr: Option<NonNull<u8>>) -> MemoryResult<()> {
        self.release(ptr)
    }

    /// Add a reference to a live block
    ///
    /// Each reference needs one extra release before the block is freed.
    pub fn reference(&mut self, ptr: NonNull<u8>) -> MemoryResult<()> {
        self.tracking.reference_calls += 1;
        match self.probe_live(ptr) {
            Ok(block) => {
                let header = block.header_mut();
                header.ref_count += 1;
                debug!(
                    serial = header.serial,
                    ref_count = header.ref_count,
                    "added block reference"
                );
                Ok(())
            }
            Err(inconsistency) => self.report(inconsistency),
        }
    }

    /// The `user_bytes` long payload of a live block
    pub fn payload(&self, ptr: NonNull<u8>) -> MemoryResult<&[u8]> {
        let block = self.probe_live(ptr).map_err(Inconsistency::into_error)?;
        Ok(block.payload(block.header().user_bytes))
    }

    pub fn payload_mut(&mut self, ptr: NonNull<u8>) -> MemoryResult<&mut [u8]> {
        let block = self.probe_live(ptr).map_err(Inconsistency::into_error)?;
        Ok(block.payload_mut(block.header().user_bytes))
    }

    /// Header snapshot of a live block
    pub fn block_info(&self, ptr: NonNull<u8>) -> MemoryResult<BlockInfo> {
        self.probe_live(ptr)
            .map(BlockRef::info)
            .map_err(Inconsistency::into_error)
    }

    fn allocate_block(&mut self, size: Size) -> MemoryResult<Option<BlockRef>> {
        if size == 0 {
            return Ok(None);
        }
        if size & ABSURD_SIZE_BIT != 0 {
            error!(size, "absurd allocation size");
            return Err(MemoryError::AbsurdSize { requested: size });
        }

        self.tracking.allocate_calls += 1;
        let serial = self.tracking.next_serial();
        let canonical = round_up(size);
        let (base, actual) = match self.take_pooled(canonical) {
            Some(found) => found,
            None => self.acquire(size, canonical)?,
        };

        // SAFETY: `base` heads `HEADER_SIZE + actual` bytes this arena owns and
        // that are on no list
        let block = unsafe { BlockRef::stamp(base, serial, size, actual) };
        if let Err(inconsistency) = self.check_block(block) {
            self.report(inconsistency)?;
        }
        self.amp_push(block);
        self.tracking.add_block(actual, size);

        debug!(
            serial,
            size,
            actual_bytes = actual,
            address = format_args!("0x{:x}", block.addr()),
            "allocated block"
        );
        self.hooks.serial_threshold(&block.info());
        Ok(Some(block))
    }

    /// Reuse a pooled block for `canonical`, returning its base and capacity
    fn take_pooled(&mut self, canonical: Size) -> Option<(NonNull<u8>, Size)> {
        let index = bucket_index_for(canonical);
        let block = if index == CATCHALL_INDEX {
            self.free.take_best_fit(canonical)?
        } else {
            self.free.pop(index)?
        };
        Some((block.base(), block.header().actual_bytes))
    }

    /// Fresh memory for `canonical` bytes: carve, merge and retry, then ask
    /// the underlying allocator
    fn acquire(&mut self, size: Size, canonical: Size) -> MemoryResult<(NonNull<u8>, Size)> {
        let need = align_up(canonical + HEADER_SIZE, BLOCK_ALIGN);
        if let Some(base) = self.slabs.carve(need) {
            return Ok((base, need - HEADER_SIZE));
        }

        if self.minimum_slab_size > 0 && self.free.pooled_bytes() >= DEFRAG_POOL_FACTOR * need {
            debug!(
                need,
                pooled = self.free.pooled_bytes(),
                "merging free blocks before growing"
            );
            self.merge_free_blocks();
            if let Some(found) = self.take_pooled(canonical) {
                return Ok(found);
            }
            if let Some(base) = self.slabs.carve(need) {
                return Ok((base, need - HEADER_SIZE));
            }
        }

        let request = need.max(self.minimum_slab_size);
        let region = loop {
            if let Some(region) = self.slabs.obtain(request) {
                break region;
            }
            warn!(size, request, "underlying allocator exhausted");
            match self.hooks.empty_pool(size) {
                EmptyPoolAction::Retry => continue,
                EmptyPoolAction::Fail => {
                    error!(size, request, "allocation failed: out of memory");
                    return Err(MemoryError::OutOfMemory { requested: request });
                }
            }
        };

        // Block sits at the tail; a front too small to ever carve stays with it
        let excess = request - need;
        if excess < HEADER_SIZE + MIN_BUCKET {
            return Ok((region, request - HEADER_SIZE));
        }
        let base = region.as_ptr() as Address;
        self.slabs.park(base, excess);
        // SAFETY: `excess < request`, so the tail stays inside the region
        let tail = unsafe { NonNull::new_unchecked(region.as_ptr().add(excess)) };
        Ok((tail, need - HEADER_SIZE))
    }
}
