/*!
 * Core Types
 * Common types used across the allocator
 */

/// Address type for memory operations
pub type Address = usize;

/// Size type for memory operations
pub type Size = usize;

/// Per-allocation serial number
pub type Serial = u64;

/// Round `value` up to the next multiple of `align` (a power of two)
#[inline]
pub const fn align_up(value: Size, align: Size) -> Size {
    (value + align - 1) & !(align - 1)
}
