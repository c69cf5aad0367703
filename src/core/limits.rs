/*!
 * Allocator Limits and Constants
 *
 * Centralized location for the size classes, alignment and sentinel values
 * used by the arena. Organized by concern for maintainability.
 *
 * ## Markers
 * - Performance-critical constants are marked with [PERF]
 * - Integrity-critical constants are marked with [SECURITY]
 */

// =============================================================================
// SIZE CLASSES
// =============================================================================

/// Smallest canonical block size (64B)
/// Every request at or below this size shares one bucket
pub const MIN_BUCKET: usize = 64;

/// First catch-all size (8KB)
/// Requests at or above this size are served best-fit from the catch-all bucket
pub const MAX_BUCKET: usize = 8 * 1024;

/// Extra bytes added to catch-all requests
/// Keeps catch-all canonical sizes off the power-of-two grid
pub const FIXED_OVERHEAD: usize = 16;

/// Fixed bucket sizes in ascending order; the catch-all slot follows the last one
pub const BUCKET_SIZES: [usize; 8] = [64, 128, 256, 512, 1024, 2048, 4096, 8192];

/// Total bucket slots, including the catch-all
pub const NUM_BUCKETS: usize = BUCKET_SIZES.len() + 1;

/// Index of the catch-all bucket
pub const CATCHALL_INDEX: usize = BUCKET_SIZES.len();

// =============================================================================
// BLOCK LAYOUT
// =============================================================================

/// Alignment of every header and payload
/// [PERF] Matches the strictest scalar alignment on supported targets
pub const BLOCK_ALIGN: usize = 16;

/// Magic stamped into every header produced by an arena
/// [SECURITY] Mismatch means the block is foreign or its metadata was overwritten
pub const POISON_TAG: u64 = 0x5EED_F00D_C0FF_EE42;

/// Requests with this bit set are rejected as absurd
/// [SECURITY] Prevents header arithmetic from overflowing
pub const ABSURD_SIZE_BIT: usize = 1 << (usize::BITS - 1);

// =============================================================================
// SLAB POOLING
// =============================================================================

/// Default minimum slab size (0 disables slab pooling)
pub const DEFAULT_MINIMUM_SLAB_SIZE: usize = 0;

/// Slab size used by the demo workload when none is configured (1MB)
pub const WORKLOAD_SLAB_SIZE: usize = 1024 * 1024;

/// Opportunistic merge runs only when the pool holds this multiple of the request
/// [PERF] Avoids an O(n log n) pass when merging cannot possibly help
pub const DEFRAG_POOL_FACTOR: usize = 2;
