/*!
 * Slab Source
 * Coarse regions from the underlying allocator, sliced from the tail
 */

use super::block::HEADER_SIZE;
use crate::core::limits::{BLOCK_ALIGN, MIN_BUCKET};
use crate::core::types::{Address, Size};
use crate::memory::traits::SystemSource;
use std::collections::BTreeMap;
use std::ptr::NonNull;
use tracing::{debug, info};

/// Unsliced bytes `[base, base + len)` at the front of a slab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Remainder {
    pub base: Address,
    pub len: Size,
}

impl Remainder {
    fn end(&self) -> Address {
        self.base + self.len
    }
}

/// Region ledger plus the remainder list
pub(super) struct SlabSource {
    source: Box<dyn SystemSource>,
    /// Every region currently held, base -> length
    regions: BTreeMap<Address, Size>,
    remainders: Vec<Remainder>,
    os_bytes_total: Size,
    os_bytes_held: Size,
}

impl SlabSource {
    pub fn new(source: Box<dyn SystemSource>) -> Self {
        Self {
            source,
            regions: BTreeMap::new(),
            remainders: Vec::new(),
            os_bytes_total: 0,
            os_bytes_held: 0,
        }
    }

    /// Request a region of `size` bytes from the underlying allocator
    pub fn obtain(&mut self, size: Size) -> Option<NonNull<u8>> {
        let ptr = self.source.obtain(size)?;
        debug_assert_eq!(ptr.as_ptr() as usize % BLOCK_ALIGN, 0);
        self.regions.insert(ptr.as_ptr() as Address, size);
        self.os_bytes_total += size;
        self.os_bytes_held += size;
        info!(
            address = format_args!("0x{:x}", ptr.as_ptr() as usize),
            size,
            held = self.os_bytes_held,
            "obtained region from underlying allocator"
        );
        Some(ptr)
    }

    /// Give a whole region back to the underlying allocator
    ///
    /// Returns the region length, or `None` if `base` does not start a region.
    pub fn give_back(&mut self, base: Address) -> Option<Size> {
        let size = self.regions.remove(&base)?;
        self.remainders.retain(|rem| !(rem.base >= base && rem.end() <= base + size));
        self.os_bytes_held -= size;
        // SAFETY: the ledger only holds regions obtained from this source,
        // and the entry was just removed so it cannot be given back twice
        unsafe {
            self.source
                .give_back(NonNull::new_unchecked(base as *mut u8), size)
        };
        debug!(
            address = format_args!("0x{:x}", base),
            size, "gave region back to underlying allocator"
        );
        Some(size)
    }

    /// Park unsliced bytes for later carving
    pub fn park(&mut self, base: Address, len: Size) {
        if len > 0 {
            self.remainders.push(Remainder { base, len });
        }
    }

    /// Carve `need` bytes from the tail of the first remainder that leaves a
    /// usable remainder behind (nothing, or room for a minimal block)
    pub fn carve(&mut self, need: Size) -> Option<NonNull<u8>> {
        let index = self
            .remainders
            .iter()
            .position(|rem| rem.len == need || rem.len >= need + HEADER_SIZE + MIN_BUCKET)?;
        let rem = &mut self.remainders[index];
        rem.len -= need;
        let block = rem.end();
        if rem.len == 0 {
            self.remainders.swap_remove(index);
        }
        NonNull::new(block as *mut u8)
    }

    /// Fold a free span back into a remainder it touches
    pub fn reattach(&mut self, base: Address, len: Size) -> bool {
        let Some(region) = self.region_of(base) else {
            return false;
        };
        let region_end = region.0 + region.1;
        for rem in &mut self.remainders {
            if rem.base < region.0 || rem.end() > region_end {
                continue;
            }
            if rem.end() == base {
                rem.len += len;
                return true;
            }
            if base + len == rem.base {
                rem.base = base;
                rem.len += len;
                return true;
            }
        }
        false
    }

    /// The region containing `addr`, as `(base, len)`
    pub fn region_of(&self, addr: Address) -> Option<(Address, Size)> {
        let (&base, &len) = self.regions.range(..=addr).next_back()?;
        (addr < base + len).then_some((base, len))
    }

    /// Whether `[addr, addr + len)` lies inside one held region
    pub fn owns(&self, addr: Address, len: Size) -> bool {
        self.region_of(addr).map_or(false, |(base, size)| {
            addr.checked_add(len).map_or(false, |end| end <= base + size)
        })
    }

    /// Whether `[addr, addr + len)` overlaps unsliced remainder bytes
    pub fn in_remainder(&self, addr: Address, len: Size) -> bool {
        let end = addr.saturating_add(len);
        self.remainders
            .iter()
            .any(|rem| addr < rem.end() && rem.base < end)
    }

    pub fn same_region(&self, a: Address, b: Address) -> bool {
        match (self.region_of(a), self.region_of(b)) {
            (Some((x, _)), Some((y, _))) => x == y,
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn remainders(&self) -> &[Remainder] {
        &self.remainders
    }

    pub fn remainder_bytes(&self) -> Size {
        self.remainders.iter().map(|rem| rem.len).sum()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn os_bytes_total(&self) -> Size {
        self.os_bytes_total
    }

    pub fn os_bytes_held(&self) -> Size {
        self.os_bytes_held
    }
}

impl Drop for SlabSource {
    fn drop(&mut self) {
        let bases: Vec<Address> = self.regions.keys().copied().collect();
        for base in bases {
            self.give_back(base);
        }
    }
}
