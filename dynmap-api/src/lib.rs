//! dynmap API - Core types and interfaces for the demand-paged region manager
//!
//! This crate provides the types, errors and collaborator interfaces shared by
//! the memory-management core and the device surface built on top of it.
//!
//! # Architecture
//!
//! The API is organized into several key modules:
//!
//! - **Core**: Page geometry constants, page indices, frame numbers and access modes
//! - **Error**: The common error type, errno translation and fault signals
//! - **Memory**: The frame allocator collaborator interface
//! - **Sync**: Lock primitives used across the workspace
//!
//! # Usage
//!
//! ```rust
//! use dynmap_api::{page_index, Error, Result, DEVICE_SIZE, PAGE_SIZE};
//!
//! fn index_of(offset: usize) -> Result<usize> {
//!     if offset >= DEVICE_SIZE {
//!         return Err(Error::OutOfRange { offset, limit: DEVICE_SIZE });
//!     }
//!     Ok(page_index(offset))
//! }
//!
//! assert_eq!(index_of(3 * PAGE_SIZE + 7), Ok(3));
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

// Core modules
pub mod core;
pub mod error;
pub mod memory;
pub mod sync;

// Re-export commonly used types
pub use crate::core::types::*;
pub use crate::error::{Error, Result, VmFault};
pub use crate::memory::interface::{FrameAllocator, RawFrame};
