//! Frame allocator implementations
//!
//! The core only talks to [`FrameAllocator`](dynmap_api::FrameAllocator);
//! this module holds the pool used by the device surface and the tests.

pub mod pool;
