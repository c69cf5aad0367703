/*!
 * Corruption Guard
 * Structural header checks and inconsistency reporting
 *
 * Detection is best-effort: it catches foreign pointers, overwritten poison
 * tags, broken AMP links and impossible sizes, not every scribble.
 */

use super::block::{BlockRef, HEADER_SIZE};
use super::hooks::Disposition;
use super::Arena;
use crate::core::limits::{BLOCK_ALIGN, POISON_TAG};
use crate::core::types::Address;
use crate::memory::types::{Inconsistency, InconsistencyKind, MemoryResult};
use std::ptr::NonNull;
use tracing::{error, warn};

impl Arena {
    /// Find the header for a payload pointer, then check it
    pub(super) fn locate(&self, ptr: NonNull<u8>) -> Result<BlockRef, Inconsistency> {
        let payload = ptr.as_ptr() as Address;
        let Some(addr) = payload.checked_sub(HEADER_SIZE) else {
            return Err(Inconsistency::new(payload, None, InconsistencyKind::Unowned));
        };
        if addr % BLOCK_ALIGN != 0 {
            return Err(Inconsistency::new(addr, None, InconsistencyKind::Misaligned));
        }
        if !self.slabs.owns(addr, HEADER_SIZE) || self.slabs.in_remainder(addr, HEADER_SIZE) {
            return Err(Inconsistency::new(addr, None, InconsistencyKind::Unowned));
        }
        // SAFETY: aligned, inside a held region and clear of unsliced bytes
        let block = unsafe { BlockRef::at(addr) }
            .ok_or_else(|| Inconsistency::new(addr, None, InconsistencyKind::NullBlock))?;
        self.check_block(block)?;
        Ok(block)
    }

    /// Structural checks on one header and its AMP neighbours
    pub(super) fn check_block(&self, block: BlockRef) -> Result<(), Inconsistency> {
        let addr = block.addr();
        if addr % BLOCK_ALIGN != 0 {
            return Err(Inconsistency::new(addr, None, InconsistencyKind::Misaligned));
        }

        let header = block.header();
        if header.poison != POISON_TAG {
            return Err(Inconsistency::new(
                addr,
                None,
                InconsistencyKind::PoisonMismatch {
                    found: header.poison,
                },
            ));
        }

        let serial = Some(header.serial);
        let span_owned = HEADER_SIZE
            .checked_add(header.actual_bytes)
            .map_or(false, |span| self.slabs.owns(addr, span));
        if header.user_bytes > header.actual_bytes || !span_owned {
            return Err(Inconsistency::new(
                addr,
                serial,
                InconsistencyKind::SizeMismatch {
                    user_bytes: header.user_bytes,
                    actual_bytes: header.actual_bytes,
                },
            ));
        }

        for link in [header.amp_prev, header.amp_next] {
            let neighbour = link as Address;
            if neighbour != 0 && !self.neighbour_is_sound(neighbour) {
                return Err(Inconsistency::new(
                    addr,
                    serial,
                    InconsistencyKind::BrokenNeighbour { neighbour },
                ));
            }
        }
        Ok(())
    }

    fn neighbour_is_sound(&self, neighbour: Address) -> bool {
        if neighbour % BLOCK_ALIGN != 0
            || !self.slabs.owns(neighbour, HEADER_SIZE)
            || self.slabs.in_remainder(neighbour, HEADER_SIZE)
        {
            return false;
        }
        // SAFETY: aligned, inside a held region and clear of unsliced bytes
        unsafe { BlockRef::at(neighbour) }.map_or(false, |block| block.header().poison == POISON_TAG)
    }

    /// Route an inconsistency through the installed handler
    ///
    /// `Ok` means the handler chose to continue; callers must still abandon
    /// the operation that detected the problem.
    pub(super) fn report(&mut self, inconsistency: Inconsistency) -> MemoryResult<()> {
        error!(
            address = format_args!("0x{:x}", inconsistency.address),
            serial = ?inconsistency.serial,
            kind = %inconsistency.kind,
            "arena inconsistency detected"
        );
        match self.hooks.inconsistency(&inconsistency) {
            Disposition::Fatal => Err(inconsistency.into_error()),
            Disposition::Continue => {
                warn!("inconsistency handler chose to continue");
                Ok(())
            }
        }
    }

    /// Locate a payload pointer that must belong to a live block
    pub(super) fn probe_live(&self, ptr: NonNull<u8>) -> Result<BlockRef, Inconsistency> {
        let block = self.locate(ptr)?;
        if !block.is_live() {
            return Err(Inconsistency::new(
                block.addr(),
                Some(block.header().serial),
                InconsistencyKind::UseAfterRelease,
            ));
        }
        Ok(block)
    }

    /// Whether `ptr` is the payload of a live block of this arena
    ///
    /// Never invokes the inconsistency handler.
    pub fn is_owned(&self, ptr: *const u8) -> bool {
        NonNull::new(ptr as *mut u8)
            .and_then(|ptr| self.probe_live(ptr).ok().map(|block| (ptr, block)))
            .map_or(false, |(ptr, block)| block.header().payload == ptr.as_ptr())
    }

    /// Run the guard over every live block, returning how many passed
    pub fn check_all(&mut self) -> MemoryResult<usize> {
        let mut checked = 0;
        let mut cursor = self.amp_head;
        while let Some(block) = cursor {
            if let Err(inconsistency) = self.check_block(block) {
                self.report(inconsistency)?;
                // Links past a bad header cannot be trusted
                break;
            }
            checked += 1;
            cursor = BlockRef::from_link(block.header().amp_next);
        }
        Ok(checked)
    }
}
