/*!
 * Arena Tracking
 * Running totals for live blocks and call counts
 */

use crate::core::types::{Serial, Size};

/// Running totals
#[derive(Debug, Clone, Default)]
pub(super) struct ArenaTracking {
    pub serial: Serial,
    pub live_bytes: Size,
    pub requested_bytes: Size,
    pub live_blocks: usize,
    pub allocate_calls: u64,
    pub release_calls: u64,
    pub reference_calls: u64,
    pub defrag_runs: u64,
}

impl ArenaTracking {
    pub fn next_serial(&mut self) -> Serial {
        self.serial += 1;
        self.serial
    }

    pub fn add_block(&mut self, actual: Size, requested: Size) {
        self.live_bytes += actual;
        self.requested_bytes += requested;
        self.live_blocks += 1;
    }

    pub fn remove_block(&mut self, actual: Size, requested: Size) {
        self.live_bytes = self.live_bytes.saturating_sub(actual);
        self.requested_bytes = self.requested_bytes.saturating_sub(requested);
        self.live_blocks = self.live_blocks.saturating_sub(1);
    }
}
