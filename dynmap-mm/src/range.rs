//! Managed range lifecycle
//!
//! A [`ManagedRange`] owns the frame table for one mapped device range. It is
//! created by [`ManagedRange::open`] and torn down by [`ManagedRange::close`],
//! which hands the table's reference on every recorded frame back exactly
//! once. Page-table entries still pointing at a frame keep it alive until the
//! OS side drops them.

use alloc::sync::Arc;

use dynmap_api::sync::{AtomicBool, AtomicU64, Ordering};
use dynmap_api::{
    is_page_aligned, Error, FrameAllocator, PageIndex, Result, DEVICE_SIZE, PAGE_SIZE,
};

use crate::frame::Frame;
use crate::frame_table::FrameTable;

/// Geometry of a managed range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeConfig {
    /// Exclusive bound on fault offsets and mapping sizes
    pub limit: usize,
}

impl RangeConfig {
    /// Create a configuration with the given limit
    pub const fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Reject limits that are empty or not a whole number of pages
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(Error::InvalidArgument("range limit must be non-zero"));
        }
        if !is_page_aligned(self.limit) {
            return Err(Error::InvalidArgument("range limit must be a multiple of the page size"));
        }
        Ok(())
    }

    /// Number of pages covered by the limit
    pub const fn page_count(&self) -> usize {
        self.limit / PAGE_SIZE
    }
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self::new(DEVICE_SIZE)
    }
}

/// Fault counters for one managed range
#[derive(Debug, Default)]
pub struct RangeStats {
    pub(crate) first_faults: AtomicU64,
    pub(crate) refaults: AtomicU64,
    pub(crate) out_of_range: AtomicU64,
    pub(crate) alloc_failures: AtomicU64,
    pub(crate) lost_races: AtomicU64,
}

/// Point-in-time copy of [`RangeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeStatsSnapshot {
    /// Faults that allocated and recorded a new frame
    pub first_faults: u64,
    /// Faults served from an existing table entry
    pub refaults: u64,
    /// Faults rejected because the offset was past the limit
    pub out_of_range: u64,
    /// Faults that failed because the allocator was exhausted
    pub alloc_failures: u64,
    /// First faults that lost the insert race and reused the winner
    pub lost_races: u64,
}

impl RangeStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters out
    pub fn snapshot(&self) -> RangeStatsSnapshot {
        RangeStatsSnapshot {
            first_faults: self.first_faults.load(Ordering::Relaxed),
            refaults: self.refaults.load(Ordering::Relaxed),
            out_of_range: self.out_of_range.load(Ordering::Relaxed),
            alloc_failures: self.alloc_failures.load(Ordering::Relaxed),
            lost_races: self.lost_races.load(Ordering::Relaxed),
        }
    }
}

/// One demand-paged range and the frames recorded for it
pub struct ManagedRange {
    pub(crate) config: RangeConfig,
    size: usize,
    pub(crate) table: FrameTable,
    pub(crate) allocator: Arc<dyn FrameAllocator>,
    closed: AtomicBool,
    pub(crate) stats: RangeStats,
}

impl ManagedRange {
    /// Establish an empty range of `size` bytes.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if `size` is zero or the configuration is invalid
    /// * `OutOfRange` if `size` exceeds the configured limit
    pub fn open(
        size: usize,
        config: RangeConfig,
        allocator: Arc<dyn FrameAllocator>,
    ) -> Result<Self> {
        config.validate()?;
        if size == 0 {
            return Err(Error::InvalidArgument("range size must be non-zero"));
        }
        if size > config.limit {
            return Err(Error::OutOfRange {
                offset: size,
                limit: config.limit,
            });
        }

        mm_info!(
            "dynmap: range opened size={:#x} limit={:#x} pages={}",
            size,
            config.limit,
            config.page_count()
        );

        Ok(Self {
            config,
            size,
            table: FrameTable::new(),
            allocator,
            closed: AtomicBool::new(false),
            stats: RangeStats::default(),
        })
    }

    /// Requested size of the range
    pub fn size(&self) -> usize {
        self.size
    }

    /// Exclusive bound on fault offsets
    pub fn limit(&self) -> usize {
        self.config.limit
    }

    /// Configuration the range was opened with
    pub fn config(&self) -> RangeConfig {
        self.config
    }

    /// Number of indices with a recorded frame
    pub fn frame_count(&self) -> usize {
        self.table.len()
    }

    /// Handle on the frame recorded for `index`, without faulting it in
    pub fn frame_at(&self, index: PageIndex) -> Option<Frame> {
        self.table.get(index)
    }

    /// Fault counters
    pub fn stats(&self) -> RangeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns true once [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Tear the range down.
    ///
    /// Releases the table's reference on every recorded frame exactly once
    /// and returns how many were released. Later calls do nothing and
    /// return zero.
    pub fn close(&self) -> usize {
        if self.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let drained = self.table.drain();
        let released = drained.len();
        for (index, frame) in drained {
            mm_debug!(
                "dynmap: free frame {} at index={} refs={}",
                frame.number(),
                index,
                frame.ref_count()
            );
            drop(frame);
        }

        mm_info!("dynmap: range closed, released {} table references", released);
        released
    }
}

impl core::fmt::Debug for ManagedRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ManagedRange")
            .field("size", &self.size)
            .field("limit", &self.config.limit)
            .field("frames", &self.table.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::pool::FramePool;

    #[test]
    fn test_open_validates_size() {
        let pool = Arc::new(FramePool::default());
        let config = RangeConfig::default();

        assert!(ManagedRange::open(DEVICE_SIZE, config, pool.clone()).is_ok());
        assert_eq!(
            ManagedRange::open(DEVICE_SIZE + PAGE_SIZE, config, pool.clone()).unwrap_err(),
            Error::OutOfRange {
                offset: DEVICE_SIZE + PAGE_SIZE,
                limit: DEVICE_SIZE
            }
        );
        assert!(matches!(
            ManagedRange::open(0, config, pool.clone()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ManagedRange::open(PAGE_SIZE, RangeConfig::new(PAGE_SIZE + 1), pool),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let pool = Arc::new(FramePool::default());
        let range = ManagedRange::open(DEVICE_SIZE, RangeConfig::default(), pool.clone()).unwrap();
        for page in 0..4 {
            drop(range.resolve(page * PAGE_SIZE).unwrap());
        }
        assert_eq!(range.close(), 4);
        assert_eq!(range.close(), 0);
        assert!(range.is_closed());
        assert!(pool.is_idle());
    }

    #[test]
    fn test_close_of_empty_range() {
        let pool = Arc::new(FramePool::default());
        let range = ManagedRange::open(PAGE_SIZE, RangeConfig::default(), pool.clone()).unwrap();
        assert_eq!(range.close(), 0);
        assert_eq!(pool.stats().allocations, 0);
    }
}
