//! Bounded frame pool
//!
//! Hands out page-sized frames up to a fixed capacity. Frame numbers are
//! recycled through a free list, so a released number is the next one
//! handed out again. Allocation and release counters make leaks and double
//! releases visible to tests.

use alloc::vec::Vec;

use hashbrown::HashSet;

use dynmap_api::sync::{AtomicU64, Mutex, Ordering};
use dynmap_api::{Error, FrameAllocator, FrameNumber, RawFrame, Result};

/// First frame number handed out by a pool
const FIRST_PFN: usize = 0x1000;

/// Default number of frames in a pool
pub const DEFAULT_POOL_FRAMES: usize = 1024;

/// Frame pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum number of frames outstanding at once
    pub capacity: usize,
    /// Frames currently handed out
    pub in_use: usize,
    /// Successful `allocate` calls
    pub allocations: u64,
    /// Accepted `release` calls
    pub releases: u64,
    /// `allocate` calls refused because the pool was exhausted
    pub failures: u64,
}

struct PoolInner {
    /// Numbers released and ready for reuse
    free_list: Vec<FrameNumber>,
    /// Next never-used number
    next: usize,
    /// Numbers currently handed out
    outstanding: HashSet<FrameNumber>,
}

/// A bounded pool of page frames
pub struct FramePool {
    capacity: usize,
    inner: Mutex<PoolInner>,
    allocations: AtomicU64,
    releases: AtomicU64,
    failures: AtomicU64,
}

impl FramePool {
    /// Create a pool that hands out at most `capacity` frames at once
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(PoolInner {
                free_list: Vec::new(),
                next: FIRST_PFN,
                outstanding: HashSet::new(),
            }),
            allocations: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Get frame pool statistics
    pub fn stats(&self) -> PoolStats {
        let in_use = self.inner.lock().outstanding.len();
        PoolStats {
            capacity: self.capacity,
            in_use,
            allocations: self.allocations.load(Ordering::Acquire),
            releases: self.releases.load(Ordering::Acquire),
            failures: self.failures.load(Ordering::Acquire),
        }
    }

    /// Check if every frame is back in the pool
    pub fn is_idle(&self) -> bool {
        self.inner.lock().outstanding.is_empty()
    }

    /// Check if no further frame can be handed out
    pub fn is_exhausted(&self) -> bool {
        self.inner.lock().outstanding.len() >= self.capacity
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_POOL_FRAMES)
    }
}

impl FrameAllocator for FramePool {
    fn allocate(&self) -> Result<RawFrame> {
        let number = {
            let mut inner = self.inner.lock();
            if inner.outstanding.len() >= self.capacity {
                None
            } else {
                let number = match inner.free_list.pop() {
                    Some(number) => number,
                    None => {
                        let number = FrameNumber::new(inner.next);
                        inner.next += 1;
                        number
                    }
                };
                inner.outstanding.insert(number);
                Some(number)
            }
        };

        match number {
            Some(number) => {
                self.allocations.fetch_add(1, Ordering::AcqRel);
                Ok(RawFrame::zeroed(number))
            }
            None => {
                self.failures.fetch_add(1, Ordering::AcqRel);
                Err(Error::OutOfMemory)
            }
        }
    }

    fn release(&self, frame: RawFrame) {
        let number = frame.number();
        let mut inner = self.inner.lock();
        if !inner.outstanding.remove(&number) {
            mm_warn!("dynmap: release of frame {} not handed out by this pool", number);
            return;
        }
        inner.free_list.push(number);
        self.releases.fetch_add(1, Ordering::AcqRel);
    }
}
