/*!
 * Astro Mempool Library
 * Reference-counted, size-classed arena allocator for frame-processing pipelines
 */

pub mod core;
pub mod memory;
pub mod monitoring;

// Re-exports
pub use memory::{
    Arena, ArenaConfig, BlockInfo, DefragMode, DefragReport, Disposition, EmptyPoolAction,
    Inconsistency, InconsistencyKind, MemoryError, MemoryResult, MemoryStats, SerialTrigger,
    SharedArena,
};
pub use monitoring::{init_tracing, span_phase};
