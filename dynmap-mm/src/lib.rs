//! dynmap Memory Management
//!
//! This crate provides the demand-paging core of dynmap: the per-range frame
//! table, the fault resolver that backs pages on first touch, the remap
//! coordinator that re-points a virtual page at another page's frame, and the
//! range lifecycle that hands every frame back to the allocator on teardown.
//!
//! The OS side is reached only through [`PageTable`] and
//! [`FrameAllocator`](dynmap_api::FrameAllocator), so everything here can be
//! exercised against [`SoftPageTable`] and [`FramePool`].

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(test)]
extern crate std;

// Re-export API types
pub use dynmap_api::{
    AccessMode, Error, FrameAllocator, FrameNumber, PageIndex, RawFrame, Result, VmFault,
    DEVICE_PAGES, DEVICE_SIZE, PAGE_SHIFT, PAGE_SIZE,
};

#[macro_use]
pub mod logging;

// Memory management modules
pub mod virtual_mem;
pub mod frame;
pub mod frame_table;
pub mod allocator;
pub mod range;
pub mod fault;
pub mod page_table;
pub mod remap;

// Re-export commonly used types and functions
pub use virtual_mem::VirtAddr;
pub use frame::Frame;
pub use frame_table::{FrameTable, InsertOutcome};
pub use allocator::pool::{FramePool, PoolStats};
pub use range::{ManagedRange, RangeConfig, RangeStats, RangeStatsSnapshot};
pub use page_table::{PageTable, PageTableEntry, SoftPageTable};
pub use remap::{remap, REMAP_ACCESS};
