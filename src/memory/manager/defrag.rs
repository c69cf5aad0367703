/*!
 * Defragmenter
 * Coalesces adjacent free blocks and returns pooled memory
 */

use super::block::BlockRef;
use super::Arena;
use crate::memory::size_class::bucket_for_capacity;
use crate::memory::types::{DefragMode, DefragReport, MemoryError, MemoryResult};
use tracing::{error, info, warn};

impl Arena {
    /// Run one defragmentation pass
    ///
    /// `ReturnToOs` is only legal while slab pooling is disabled.
    pub fn defragment(&mut self, mode: DefragMode) -> MemoryResult<DefragReport> {
        match mode {
            DefragMode::ReturnToOs => self.return_to_os(),
            DefragMode::Merge => Ok(self.merge_free_blocks()),
        }
    }

    fn return_to_os(&mut self) -> MemoryResult<DefragReport> {
        if self.minimum_slab_size > 0 {
            error!(
                minimum_slab_size = self.minimum_slab_size,
                "cannot return memory to the OS with slab pooling enabled"
            );
            return Err(MemoryError::IllegalDefragment {
                minimum_slab_size: self.minimum_slab_size,
            });
        }
        self.tracking.defrag_runs += 1;

        let blocks = self.free.drain_all();
        let mut report = DefragReport {
            examined: blocks.len(),
            ..Default::default()
        };
        let mut kept = 0;
        for block in blocks {
            let whole_region = Some((block.addr(), block.span()));
            if self.slabs.region_of(block.addr()) == whole_region {
                if let Some(size) = self.slabs.give_back(block.addr()) {
                    report.returned_bytes += size;
                    continue;
                }
            }
            kept += 1;
            self.free.push(bucket_for_capacity(block.header().actual_bytes), block);
        }

        if kept > 0 {
            warn!(kept, "free blocks share a region and stay pooled");
        }
        info!(
            examined = report.examined,
            returned_bytes = report.returned_bytes,
            held = self.slabs.os_bytes_held(),
            "returned pooled memory to the underlying allocator"
        );
        Ok(report)
    }

    /// Merge address-contiguous free blocks of the same region
    ///
    /// Absorbed headers are wiped. A merged block touching a slab remainder
    /// is folded into it; the rest go to the largest bucket they can serve.
    pub(super) fn merge_free_blocks(&mut self) -> DefragReport {
        self.tracking.defrag_runs += 1;

        let mut blocks = self.free.drain_all();
        blocks.sort_unstable_by_key(|block| block.addr());
        let mut report = DefragReport {
            examined: blocks.len(),
            ..Default::default()
        };

        let mut merged: Vec<BlockRef> = Vec::with_capacity(blocks.len());
        for block in blocks {
            if let Some(&last) = merged.last() {
                let contiguous = last.end() == block.addr();
                if contiguous && self.slabs.same_region(last.addr(), block.addr()) {
                    last.header_mut().actual_bytes += block.span();
                    block.wipe();
                    report.absorbed += 1;
                    continue;
                }
            }
            merged.push(block);
        }

        for block in merged {
            if self.slabs.reattach(block.addr(), block.span()) {
                block.wipe();
                report.reattached += 1;
            } else {
                let index = bucket_for_capacity(block.header().actual_bytes);
                self.free.push(index, block);
            }
        }

        info!(
            examined = report.examined,
            absorbed = report.absorbed,
            reattached = report.reattached,
            pooled = self.free.len(),
            "merged free blocks"
        );
        report
    }
}
