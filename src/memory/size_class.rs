/*!
 * Size-Class Router
 * Maps request sizes to canonical bucket sizes and bucket indices
 *
 * Fixed buckets are powers of two from `MIN_BUCKET` to 8KB. Requests of
 * `MAX_BUCKET` bytes or more get a unique canonical size and land in the
 * catch-all bucket, which is searched best-fit.
 */

use crate::core::limits::{
    BUCKET_SIZES, CATCHALL_INDEX, FIXED_OVERHEAD, MAX_BUCKET, MIN_BUCKET,
};
use crate::core::types::Size;

/// Canonical size for a request of `size` bytes
#[inline]
pub fn round_up(size: Size) -> Size {
    if size <= MIN_BUCKET {
        MIN_BUCKET
    } else if size >= MAX_BUCKET {
        size + FIXED_OVERHEAD
    } else {
        size.next_power_of_two()
    }
}

/// Bucket index for a canonical size produced by [`round_up`]
///
/// Non-canonical sizes below the catch-all range are a programmer error.
#[inline]
pub fn bucket_index_for(canonical: Size) -> usize {
    if canonical > MAX_BUCKET {
        return CATCHALL_INDEX;
    }
    let index = BUCKET_SIZES.iter().position(|&bucket| bucket == canonical);
    debug_assert!(
        index.is_some(),
        "{} is not a canonical bucket size",
        canonical
    );
    index.unwrap_or(CATCHALL_INDEX)
}

/// Bucket for a free block that can hold `capacity` bytes
///
/// Picks the largest bucket whose canonical size does not exceed the
/// capacity, so a pooled block always satisfies any request routed to it.
#[inline]
pub fn bucket_for_capacity(capacity: Size) -> usize {
    if capacity > MAX_BUCKET {
        return CATCHALL_INDEX;
    }
    BUCKET_SIZES
        .iter()
        .rposition(|&bucket| bucket <= capacity)
        .unwrap_or(0)
}

/// Canonical size of a fixed bucket, `None` for the catch-all
#[inline]
pub fn bucket_size(index: usize) -> Option<Size> {
    BUCKET_SIZES.get(index).copied()
}
