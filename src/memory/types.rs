/*!
 * Memory Types
 * Common types for the arena allocator
 */

use super::size_class::bucket_size;
use crate::core::types::{Address, Serial, Size};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum MemoryError {
    #[error("Absurd allocation size: {requested} bytes")]
    #[diagnostic(
        code(memory::absurd_size),
        help("The request has its top bit set or overflowed while computing count * size.")
    )]
    AbsurdSize { requested: Size },

    #[error("Out of memory: underlying allocator refused {requested} bytes")]
    #[diagnostic(
        code(memory::out_of_memory),
        help("Install an empty-pool handler that releases reserves, or lower the minimum slab size.")
    )]
    OutOfMemory { requested: Size },

    #[error("Memory corruption detected at 0x{address:x} (serial {serial:?}): {kind}")]
    #[diagnostic(
        code(memory::corruption),
        help("Block metadata was overwritten; continuing past this point is unsafe.")
    )]
    Corruption {
        address: Address,
        serial: Option<Serial>,
        kind: InconsistencyKind,
    },

    #[error("Double release of block 0x{address:x} (serial {serial})")]
    #[diagnostic(
        code(memory::double_release),
        help("The block was already returned to the free pool by an earlier release.")
    )]
    DoubleRelease { address: Address, serial: Serial },

    #[error("Pointer 0x{0:x} is not owned by this arena")]
    #[diagnostic(
        code(memory::unowned_pointer),
        help("Only pointers returned by this arena's allocate calls may be released or referenced.")
    )]
    UnownedPointer(Address),

    #[error("Cannot return memory to the OS while slab pooling is enabled (minimum slab size {minimum_slab_size})")]
    #[diagnostic(
        code(memory::illegal_defragment),
        help("Use DefragMode::Merge when a minimum slab size is configured.")
    )]
    IllegalDefragment { minimum_slab_size: Size },

    #[error("Minimum slab size cannot be lowered to zero once set (currently {current})")]
    #[diagnostic(code(memory::slab_size_locked))]
    SlabSizeLocked { current: Size },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(memory::invalid_config))]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(memory::serialization))]
    Serialization(String),
}

/// What a corruption check found wrong with a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    NullBlock,
    Misaligned,
    PoisonMismatch { found: u64 },
    BrokenNeighbour { neighbour: Address },
    SizeMismatch { user_bytes: Size, actual_bytes: Size },
    DoubleRelease,
    UseAfterRelease,
    Unowned,
}

impl fmt::Display for InconsistencyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InconsistencyKind::NullBlock => write!(f, "null block"),
            InconsistencyKind::Misaligned => write!(f, "misaligned header"),
            InconsistencyKind::PoisonMismatch { found } => {
                write!(f, "poison tag mismatch (found 0x{:x})", found)
            }
            InconsistencyKind::BrokenNeighbour { neighbour } => {
                write!(f, "broken AMP neighbour at 0x{:x}", neighbour)
            }
            InconsistencyKind::SizeMismatch {
                user_bytes,
                actual_bytes,
            } => write!(
                f,
                "user bytes {} exceed actual bytes {}",
                user_bytes, actual_bytes
            ),
            InconsistencyKind::DoubleRelease => write!(f, "double release"),
            InconsistencyKind::UseAfterRelease => write!(f, "block already released"),
            InconsistencyKind::Unowned => write!(f, "pointer not owned by arena"),
        }
    }
}

/// A failed integrity check, as handed to the inconsistency handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inconsistency {
    /// Header address of the offending block
    pub address: Address,
    /// Serial number, when the header was readable
    pub serial: Option<Serial>,
    pub kind: InconsistencyKind,
}

impl Inconsistency {
    pub fn new(address: Address, serial: Option<Serial>, kind: InconsistencyKind) -> Self {
        Self {
            address,
            serial,
            kind,
        }
    }

    /// Error reported when the handler treats this as fatal
    pub fn into_error(self) -> MemoryError {
        match self.kind {
            InconsistencyKind::DoubleRelease => MemoryError::DoubleRelease {
                address: self.address,
                serial: self.serial.unwrap_or_default(),
            },
            InconsistencyKind::Unowned => MemoryError::UnownedPointer(self.address),
            kind => MemoryError::Corruption {
                address: self.address,
                serial: self.serial,
                kind,
            },
        }
    }
}

/// Snapshot of one block's header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub address: Address,
    pub serial: Serial,
    pub user_bytes: Size,
    pub actual_bytes: Size,
    pub ref_count: usize,
}

/// Defragmentation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefragMode {
    /// Hand every pooled block back to the underlying allocator
    ReturnToOs,
    /// Coalesce address-contiguous free blocks
    Merge,
}

/// Outcome of a defragmentation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefragReport {
    /// Free blocks examined
    pub examined: usize,
    /// Blocks absorbed into a lower neighbour
    pub absorbed: usize,
    /// Merged blocks folded back into a slab remainder
    pub reattached: usize,
    /// Bytes handed back to the underlying allocator
    pub returned_bytes: Size,
}

/// Arena statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Last serial number handed out
    pub serial: Serial,
    /// Bytes ever requested from the underlying allocator
    pub os_bytes_total: Size,
    /// Bytes currently held from the underlying allocator
    pub os_bytes_held: Size,
    /// Usable bytes of live blocks
    pub bytes_in_use: Size,
    /// Bytes callers asked for across live blocks
    pub bytes_requested: Size,
    /// Usable bytes of pooled free blocks
    pub bytes_pooled: Size,
    /// Unsliced slab bytes
    pub slab_remainder_bytes: Size,
    pub live_blocks: usize,
    pub pooled_blocks: usize,
    pub allocate_calls: u64,
    pub release_calls: u64,
    pub reference_calls: u64,
    pub defrag_runs: u64,
    pub minimum_slab_size: Size,
    /// Pooled block count per bucket, catch-all last
    pub bucket_counts: Vec<usize>,
}

impl MemoryStats {
    /// Serialize the snapshot as JSON
    pub fn to_json(&self) -> MemoryResult<String> {
        serde_json::to_string(self).map_err(|e| MemoryError::Serialization(e.to_string()))
    }
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Arena statistics (serial {})", self.serial)?;
        writeln!(
            f,
            "  OS bytes:        {} held / {} requested",
            self.os_bytes_held, self.os_bytes_total
        )?;
        writeln!(
            f,
            "  In use:          {} bytes in {} blocks ({} requested)",
            self.bytes_in_use, self.live_blocks, self.bytes_requested
        )?;
        writeln!(
            f,
            "  Pooled:          {} bytes in {} blocks",
            self.bytes_pooled, self.pooled_blocks
        )?;
        writeln!(f, "  Slab remainder:  {} bytes", self.slab_remainder_bytes)?;
        writeln!(f, "  Min slab size:   {} bytes", self.minimum_slab_size)?;
        writeln!(
            f,
            "  Calls:           {} allocate, {} release, {} reference, {} defragment",
            self.allocate_calls, self.release_calls, self.reference_calls, self.defrag_runs
        )?;
        write!(f, "  Buckets:        ")?;
        for (index, count) in self.bucket_counts.iter().enumerate() {
            match bucket_size(index) {
                Some(size) => write!(f, " {}B={}", size, count)?,
                None => write!(f, " catch-all={}", count)?,
            }
        }
        Ok(())
    }
}
