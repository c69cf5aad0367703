/*!
 * Free Memory Pool
 * Size-classed free lists threaded through block headers
 */

use super::block::BlockRef;
use crate::core::limits::{CATCHALL_INDEX, NUM_BUCKETS};
use crate::core::types::Size;
use std::ptr;

/// Free memory pool
/// - Fixed buckets: LIFO singly linked lists, O(1) push and pop
/// - Catch-all bucket: linear best-fit scan on allocation
#[derive(Debug)]
pub(super) struct FreeBuckets {
    heads: [Option<BlockRef>; NUM_BUCKETS],
    counts: [usize; NUM_BUCKETS],
    pooled_bytes: Size,
}

impl FreeBuckets {
    pub fn new() -> Self {
        Self {
            heads: [None; NUM_BUCKETS],
            counts: [0; NUM_BUCKETS],
            pooled_bytes: 0,
        }
    }

    pub fn push(&mut self, index: usize, block: BlockRef) {
        let header = block.header_mut();
        header.fmp_next = self.heads[index].map_or(ptr::null_mut(), BlockRef::as_link);
        self.heads[index] = Some(block);
        self.counts[index] += 1;
        self.pooled_bytes += header.actual_bytes;
    }

    /// Pop the most recently pushed block of a fixed bucket
    pub fn pop(&mut self, index: usize) -> Option<BlockRef> {
        let block = self.heads[index]?;
        let header = block.header_mut();
        self.heads[index] = BlockRef::from_link(header.fmp_next);
        header.fmp_next = ptr::null_mut();
        self.counts[index] -= 1;
        self.pooled_bytes -= header.actual_bytes;
        Some(block)
    }

    /// Take the catch-all block with the least leftover that still fits
    ///
    /// Stops at the first exact fit; among equal leftovers the first in list
    /// order wins.
    pub fn take_best_fit(&mut self, canonical: Size) -> Option<BlockRef> {
        let mut best: Option<(Option<BlockRef>, BlockRef, Size)> = None;
        let mut prev: Option<BlockRef> = None;
        let mut cursor = self.heads[CATCHALL_INDEX];

        while let Some(block) = cursor {
            let actual = block.header().actual_bytes;
            if actual >= canonical {
                let leftover = actual - canonical;
                if best.map_or(true, |(_, _, best_leftover)| leftover < best_leftover) {
                    best = Some((prev, block, leftover));
                    if leftover == 0 {
                        break;
                    }
                }
            }
            prev = Some(block);
            cursor = BlockRef::from_link(block.header().fmp_next);
        }

        let (prev, block, _) = best?;
        let header = block.header_mut();
        match prev {
            Some(prev) => prev.header_mut().fmp_next = header.fmp_next,
            None => self.heads[CATCHALL_INDEX] = BlockRef::from_link(header.fmp_next),
        }
        header.fmp_next = ptr::null_mut();
        self.counts[CATCHALL_INDEX] -= 1;
        self.pooled_bytes -= header.actual_bytes;
        Some(block)
    }

    /// Empty every bucket, returning the blocks in no particular order
    pub fn drain_all(&mut self) -> Vec<BlockRef> {
        let mut all_blocks = Vec::with_capacity(self.len());
        for index in 0..NUM_BUCKETS {
            while let Some(block) = self.pop(index) {
                all_blocks.push(block);
            }
        }
        all_blocks
    }

    pub fn len(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn counts(&self) -> &[usize; NUM_BUCKETS] {
        &self.counts
    }

    pub fn pooled_bytes(&self) -> Size {
        self.pooled_bytes
    }

    /// Walk one bucket
    #[cfg(test)]
    pub fn iter(&self, index: usize) -> impl Iterator<Item = BlockRef> + '_ {
        std::iter::successors(self.heads[index], |block| {
            BlockRef::from_link(block.header().fmp_next)
        })
    }
}
