/*!
 * Arena Allocator
 *
 * Reference-counted, size-classed allocator with in-band block headers.
 *
 * ## Pools
 *
 * - **AMP** (allocated memory pool): doubly linked list of live blocks,
 *   threaded through the headers, O(1) unlink on release
 * - **FMP** (free memory pool): one singly linked list per size class
 *   - Fixed buckets (64B .. 8KB, powers of two): LIFO reuse
 *   - Catch-all bucket (>= 8KB requests): best-fit scan
 * - **Slabs**: coarse regions from the underlying allocator, carved from
 *   the tail when a minimum slab size is configured
 *
 * ## Lifecycle
 *
 * `allocate` stamps a header and links the block into the AMP. `release`
 * decrements the reference count, or, at zero, unlinks the block and
 * pushes it onto its bucket. `defragment` coalesces neighbouring free
 * blocks or hands pooled memory back to the underlying allocator.
 *
 * An arena is single-threaded. Use one per thread, or share one through
 * [`crate::memory::SharedArena`].
 */

mod allocator;
pub(crate) mod block;
mod defrag;
mod free_list;
mod guard;
pub mod hooks;
mod slab;
mod tracking;

pub use hooks::{
    Disposition, EmptyPoolAction, EmptyPoolHandler, InconsistencyHandler, SerialHandler,
    SerialTrigger,
};

use crate::core::limits::{ABSURD_SIZE_BIT, BLOCK_ALIGN, NUM_BUCKETS};
use crate::core::types::{align_up, Serial, Size};
use crate::memory::traits::{HeapSource, SystemSource};
use crate::memory::types::{BlockInfo, MemoryError, MemoryResult, MemoryStats};
use block::BlockRef;
use free_list::FreeBuckets;
use hooks::Hooks;
use slab::SlabSource;
use std::fmt;
use std::ptr;
use tracing::{error, info};
use tracking::ArenaTracking;

/// Arena allocator context
///
/// Owns every region it obtained; dropping the arena gives them all back to
/// the underlying allocator, invalidating every pointer it handed out.
pub struct Arena {
    amp_head: Option<BlockRef>,
    free: FreeBuckets,
    slabs: SlabSource,
    hooks: Hooks,
    tracking: ArenaTracking,
    minimum_slab_size: Size,
}

// SAFETY: the arena exclusively owns the memory its raw links point into;
// no header reference outlives a method call, so moving the whole arena to
// another thread moves sole access with it.
unsafe impl Send for Arena {}

impl Arena {
    /// Arena over the process heap with slab pooling disabled
    pub fn new() -> Self {
        Self::with_source(HeapSource)
    }

    /// Arena over a custom underlying allocator
    pub fn with_source<S: SystemSource + 'static>(source: S) -> Self {
        info!("Arena initialized with {} size classes", NUM_BUCKETS);
        Self {
            amp_head: None,
            free: FreeBuckets::new(),
            slabs: SlabSource::new(Box::new(source)),
            hooks: Hooks::default(),
            tracking: ArenaTracking::default(),
            minimum_slab_size: 0,
        }
    }

    /// Builder form of [`Arena::set_minimum_slab_size`]
    pub fn with_minimum_slab_size(mut self, size: Size) -> MemoryResult<Self> {
        self.set_minimum_slab_size(size)?;
        Ok(self)
    }

    /// Configure slab pooling, returning the previous minimum slab size
    ///
    /// Zero disables pooling; once nonzero it cannot be set back to zero.
    /// Sizes are rounded up to the block alignment.
    pub fn set_minimum_slab_size(&mut self, size: Size) -> MemoryResult<Size> {
        let previous = self.minimum_slab_size;
        if size == 0 && previous > 0 {
            error!(current = previous, "refusing to disable slab pooling");
            return Err(MemoryError::SlabSizeLocked { current: previous });
        }
        if size & ABSURD_SIZE_BIT != 0 {
            error!(size, "rejecting absurd minimum slab size");
            return Err(MemoryError::InvalidConfig(format!(
                "minimum slab size {} is too large",
                size
            )));
        }
        self.minimum_slab_size = align_up(size, BLOCK_ALIGN);
        info!(
            previous,
            minimum_slab_size = self.minimum_slab_size,
            "minimum slab size configured"
        );
        Ok(previous)
    }

    pub fn minimum_slab_size(&self) -> Size {
        self.minimum_slab_size
    }

    /// Install the exhaustion handler, returning the previous one
    pub fn set_on_empty_pool(&mut self, handler: EmptyPoolHandler) -> Option<EmptyPoolHandler> {
        self.hooks.on_empty_pool.replace(handler)
    }

    /// Install the inconsistency handler, returning the previous one
    pub fn set_on_inconsistency(
        &mut self,
        handler: InconsistencyHandler,
    ) -> Option<InconsistencyHandler> {
        self.hooks.on_inconsistency.replace(handler)
    }

    /// Fire `handler` on allocations matching `trigger`
    pub fn set_on_serial_threshold(&mut self, trigger: SerialTrigger, handler: SerialHandler) {
        self.hooks.on_serial_threshold = Some((trigger, handler));
    }

    /// Fire `handler` when the block with `serial` is released
    pub fn set_on_free_of_serial(&mut self, serial: Serial, handler: SerialHandler) {
        self.hooks.on_free_of_serial = Some((serial, handler));
    }

    /// Remove every installed handler, restoring default behaviour
    pub fn reset_hooks(&mut self) {
        self.hooks = Hooks::default();
    }

    /// Last serial number handed out
    pub fn serial(&self) -> Serial {
        self.tracking.serial
    }

    pub fn bytes_in_use(&self) -> Size {
        self.tracking.live_bytes
    }

    pub fn bytes_pooled(&self) -> Size {
        self.free.pooled_bytes()
    }

    /// Bytes ever requested from the underlying allocator
    pub fn os_bytes(&self) -> Size {
        self.slabs.os_bytes_total()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            serial: self.tracking.serial,
            os_bytes_total: self.slabs.os_bytes_total(),
            os_bytes_held: self.slabs.os_bytes_held(),
            bytes_in_use: self.tracking.live_bytes,
            bytes_requested: self.tracking.requested_bytes,
            bytes_pooled: self.free.pooled_bytes(),
            slab_remainder_bytes: self.slabs.remainder_bytes(),
            live_blocks: self.tracking.live_blocks,
            pooled_blocks: self.free.len(),
            allocate_calls: self.tracking.allocate_calls,
            release_calls: self.tracking.release_calls,
            reference_calls: self.tracking.reference_calls,
            defrag_runs: self.tracking.defrag_runs,
            minimum_slab_size: self.minimum_slab_size,
            bucket_counts: self.free.counts().to_vec(),
        }
    }

    /// Header snapshots of every live block, most recent first
    pub fn live_blocks(&self) -> Vec<BlockInfo> {
        self.amp_iter().map(BlockRef::info).collect()
    }

    fn amp_iter(&self) -> impl Iterator<Item = BlockRef> + '_ {
        std::iter::successors(self.amp_head, |block| {
            BlockRef::from_link(block.header().amp_next)
        })
    }

    fn amp_push(&mut self, block: BlockRef) {
        let header = block.header_mut();
        header.amp_prev = ptr::null_mut();
        header.amp_next = self.amp_head.map_or(ptr::null_mut(), BlockRef::as_link);
        if let Some(head) = self.amp_head {
            head.header_mut().amp_prev = block.as_link();
        }
        self.amp_head = Some(block);
    }

    fn amp_unlink(&mut self, block: BlockRef) {
        let header = block.header_mut();
        let next = BlockRef::from_link(header.amp_next);
        match BlockRef::from_link(header.amp_prev) {
            Some(prev) => prev.header_mut().amp_next = header.amp_next,
            None => self.amp_head = next,
        }
        if let Some(next) = next {
            next.header_mut().amp_prev = header.amp_prev;
        }
        header.amp_next = ptr::null_mut();
        header.amp_prev = ptr::null_mut();
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("serial", &self.tracking.serial)
            .field("live_blocks", &self.tracking.live_blocks)
            .field("pooled_blocks", &self.free.len())
            .field("regions", &self.slabs.region_count())
            .field("minimum_slab_size", &self.minimum_slab_size)
            .finish()
    }
}
