//! Device object
//!
//! Registration is an explicit value: creating a [`DynMapDevice`] stands for
//! registering the node, dropping it (or calling
//! [`DynMapDevice::unregister`]) for removing it. Each [`DynMapDevice::open`]
//! yields an independent [`DeviceFile`].

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use dynmap_api::{FrameAllocator, Result};
use dynmap_mm::{mm_info, mm_warn};

use crate::config::{DeviceConfig, DeviceNumber};
use crate::file::DeviceFile;

/// A registered dynmap device
pub struct DynMapDevice {
    config: DeviceConfig,
    allocator: Arc<dyn FrameAllocator>,
    open_files: Arc<AtomicUsize>,
}

impl DynMapDevice {
    /// Register a device that draws frames from `allocator`
    pub fn register(config: DeviceConfig, allocator: Arc<dyn FrameAllocator>) -> Result<Self> {
        config.validate()?;
        mm_info!(
            "{}: registered as {} (range limit {:#x})",
            config.name,
            config.number,
            config.range.limit
        );
        Ok(Self {
            config,
            allocator,
            open_files: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Open a new file on the device
    pub fn open(&self) -> DeviceFile {
        let open = self.open_files.fetch_add(1, Ordering::AcqRel) + 1;
        mm_info!("{}: opened ({} open)", self.config.name, open);
        DeviceFile::new(
            self.config,
            Arc::clone(&self.allocator),
            Arc::clone(&self.open_files),
        )
    }

    /// Device configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Device number
    pub fn number(&self) -> DeviceNumber {
        self.config.number
    }

    /// Files opened on the device and not yet released
    pub fn open_files(&self) -> usize {
        self.open_files.load(Ordering::Acquire)
    }

    /// Remove the device node
    ///
    /// Files still open keep working; they hold their own handle on the
    /// allocator.
    pub fn unregister(self) {
        drop(self);
    }
}

impl Drop for DynMapDevice {
    fn drop(&mut self) {
        let open = self.open_files();
        if open > 0 {
            mm_warn!("{}: unregistered with {} files open", self.config.name, open);
        }
        mm_info!("{}: unregistered", self.config.name);
    }
}
