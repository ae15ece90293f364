//! Fault resolution
//!
//! Resolves a faulting offset to the frame that must back it. The first
//! fault on an index allocates and records a frame; every later fault on the
//! same index, including refaults after the page-table entry was dropped and
//! faults through a second mapping, gets the recorded frame back.

use alloc::sync::Arc;

use dynmap_api::{fill_byte, page_index, Error, Result, VmFault};

use crate::frame::Frame;
use crate::range::{ManagedRange, RangeStats};

impl ManagedRange {
    /// Resolve a fault at `offset` within the range.
    ///
    /// The returned handle is the reference the caller installs into its
    /// page table.
    ///
    /// # Errors
    ///
    /// * `OutOfRange` if `offset` is not below the range limit; nothing is allocated
    /// * `OutOfMemory` if the allocator has no frame; the range stays usable
    /// * `Closed` if the range has been torn down
    pub fn resolve(&self, offset: usize) -> Result<Frame> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let limit = self.config.limit;
        if offset >= limit {
            RangeStats::bump(&self.stats.out_of_range);
            mm_debug!("dynmap: fault offset={:#x} beyond limit={:#x}", offset, limit);
            return Err(Error::OutOfRange { offset, limit });
        }

        let index = page_index(offset);
        if let Some(frame) = self.table.get(index) {
            RangeStats::bump(&self.stats.refaults);
            mm_debug!(
                "dynmap: refault at offset={:#x} -> reusing frame {}",
                offset,
                frame.number()
            );
            return Ok(frame);
        }

        mm_debug!("dynmap: first fault at offset={:#x} index={}", offset, index);

        let mut raw = self.allocator.allocate().map_err(|err| {
            RangeStats::bump(&self.stats.alloc_failures);
            mm_warn!("dynmap: frame allocation failed at index={}: {}", index, err);
            Error::OutOfMemory
        })?;
        raw.memory_mut().fill(fill_byte(index));

        let number = raw.number();
        mm_debug!(
            "dynmap: allocated frame {} phys_addr={:#x}",
            number,
            number.phys_addr()
        );

        let outcome = self
            .table
            .insert_if_absent(index, Frame::new(raw, Arc::clone(&self.allocator)));

        // close() may have drained the table while the frame was allocated
        if self.is_closed() {
            let stale = self.table.remove(index);
            mm_debug!("dynmap: index={} recorded after close, dropping it", index);
            drop(outcome);
            drop(stale);
            return Err(Error::Closed);
        }

        if outcome.inserted {
            RangeStats::bump(&self.stats.first_faults);
        } else {
            RangeStats::bump(&self.stats.lost_races);
            mm_debug!(
                "dynmap: index={} already recorded, dropping frame {}",
                index,
                number
            );
        }
        Ok(outcome.frame)
    }

    /// Fault callback for the OS collaborator.
    ///
    /// Same as [`resolve`](Self::resolve) with the error translated into the
    /// signal delivered to the faulting process.
    pub fn fault(&self, offset: usize) -> core::result::Result<Frame, VmFault> {
        self.resolve(offset).map_err(VmFault::from)
    }
}
