//! dynmap Device
//!
//! This crate exposes a demand-paged range through a character-device style
//! surface and provides the address space that drives it:
//!
//! - **Device**: explicit device object replacing module-global registration
//! - **File**: per-open state; `mmap`, the remap `ioctl` and `release`
//! - **Ioctl**: command encoding and the remap request payload
//! - **Space**: the consumer's address space, its mappings and its page table
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use dynmap_dev::{AddressSpace, DeviceConfig, DynMapDevice};
//! use dynmap_mm::{AccessMode, FramePool, PAGE_SIZE};
//!
//! let device = DynMapDevice::register(DeviceConfig::default(), Arc::new(FramePool::default())).unwrap();
//! let space = AddressSpace::new();
//! let file = device.open();
//!
//! let base = file.mmap(&space, 16 * PAGE_SIZE, AccessMode::SHARED_RW).unwrap();
//! let third = base.checked_add(3 * PAGE_SIZE).unwrap();
//! assert_eq!(space.read_byte(third).unwrap(), 3);
//! ```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod device;
pub mod file;
pub mod ioctl;
pub mod space;

pub use config::{DeviceConfig, DeviceNumber, DEVICE_NAME};
pub use device::DynMapDevice;
pub use file::DeviceFile;
pub use ioctl::{RemapArgs, DYNMAP_IOC_MAGIC, DYNMAP_IOC_REMAP};
pub use space::{AddressSpace, VmArea, MMAP_BASE};
