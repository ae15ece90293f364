//! Per-open device state
//!
//! A [`DeviceFile`] owns at most one managed range, created by the first
//! `mmap`. Releasing the file tears the range down; mappings made from it
//! stay in their address space, and their next fault is refused.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dynmap_api::sync::Mutex;
use dynmap_api::{AccessMode, Error, FrameAllocator, Result};
use dynmap_mm::{mm_debug, mm_info, ManagedRange, RangeStatsSnapshot, VirtAddr};

use crate::config::DeviceConfig;
use crate::ioctl::{RemapArgs, DYNMAP_IOC_REMAP};
use crate::space::AddressSpace;

/// An open file on a dynmap device
pub struct DeviceFile {
    config: DeviceConfig,
    allocator: Arc<dyn FrameAllocator>,
    range: Mutex<Option<Arc<ManagedRange>>>,
    released: AtomicBool,
    open_files: Arc<AtomicUsize>,
}

impl DeviceFile {
    pub(crate) fn new(
        config: DeviceConfig,
        allocator: Arc<dyn FrameAllocator>,
        open_files: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            config,
            allocator,
            range: Mutex::new(None),
            released: AtomicBool::new(false),
            open_files,
        }
    }

    /// Map `length` bytes of the device into `space`.
    ///
    /// The first call creates the file's range; later calls map the same
    /// range again. No page is populated until it is touched.
    ///
    /// # Errors
    ///
    /// * `Closed` if the file has been released
    /// * `InvalidArgument` for a zero length
    /// * `OutOfRange` if `length` exceeds the configured limit
    pub fn mmap(&self, space: &AddressSpace, length: usize, prot: AccessMode) -> Result<VirtAddr> {
        if self.is_released() {
            return Err(Error::Closed);
        }
        mm_info!("{}: mmap requested, size={:#x}", self.config.name, length);
        let range = self.range_for(length)?;
        let start = space.mmap(length, prot, range)?;
        mm_info!("{}: mapped at {}", self.config.name, start);
        Ok(start)
    }

    fn range_for(&self, length: usize) -> Result<Arc<ManagedRange>> {
        let mut slot = self.range.lock();
        if let Some(range) = slot.as_ref() {
            if length > range.limit() {
                return Err(Error::OutOfRange {
                    offset: length,
                    limit: range.limit(),
                });
            }
            return Ok(Arc::clone(range));
        }
        let range = Arc::new(ManagedRange::open(
            length,
            self.config.range,
            Arc::clone(&self.allocator),
        )?);
        *slot = Some(Arc::clone(&range));
        Ok(range)
    }

    /// Handle a control command.
    ///
    /// `arg` holds the command's argument block as the caller laid it out.
    ///
    /// # Errors
    ///
    /// * `NotSupported` for an unknown command
    /// * `InvalidArgument` if `arg` is too short
    /// * whatever [`DeviceFile::remap`] reports
    pub fn ioctl(&self, space: &AddressSpace, cmd: u32, arg: &[u8]) -> Result<()> {
        match cmd {
            DYNMAP_IOC_REMAP => {
                let args = RemapArgs::from_bytes(arg)?;
                self.remap(space, args)
            }
            _ => {
                mm_debug!("{}: unknown ioctl {:#x}", self.config.name, cmd);
                Err(Error::NotSupported(cmd))
            }
        }
    }

    /// Make the page containing `addr + offset` show the frame currently
    /// backing the page containing `addr`.
    pub fn remap(&self, space: &AddressSpace, args: RemapArgs) -> Result<()> {
        let (from, to) = args.endpoints()?;
        space.remap(from, to)
    }

    /// Tear down the file's range.
    ///
    /// Returns the number of frames the range still held. Releasing twice,
    /// or releasing a file that never mapped anything, is harmless.
    pub fn release(&self) -> usize {
        if self.released.swap(true, Ordering::AcqRel) {
            return 0;
        }
        self.open_files.fetch_sub(1, Ordering::AcqRel);
        let range = self.range.lock().take();
        let freed = range.map_or(0, |range| range.close());
        mm_info!("{}: released, {} frames dropped", self.config.name, freed);
        freed
    }

    /// Returns true once the file has been released
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// The file's range, if it has been mapped and not released
    pub fn range(&self) -> Option<Arc<ManagedRange>> {
        self.range.lock().clone()
    }

    /// Counters of the file's range
    pub fn stats(&self) -> Option<RangeStatsSnapshot> {
        self.range.lock().as_ref().map(|range| range.stats())
    }
}

impl Drop for DeviceFile {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for DeviceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceFile")
            .field("device", &self.config.name)
            .field("range", &*self.range.lock())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DynMapDevice;
    use dynmap_api::{DEVICE_SIZE, PAGE_SIZE};
    use dynmap_mm::FramePool;

    fn device() -> DynMapDevice {
        DynMapDevice::register(DeviceConfig::default(), Arc::new(FramePool::default())).unwrap()
    }

    #[test]
    fn test_second_mmap_shares_range() {
        let device = device();
        let file = device.open();
        let space = AddressSpace::new();
        let a = file.mmap(&space, DEVICE_SIZE, AccessMode::SHARED_RW).unwrap();
        let b = file.mmap(&space, DEVICE_SIZE, AccessMode::SHARED_RW).unwrap();

        space.write_byte(a, 0x5a).unwrap();
        assert_eq!(space.read_byte(b).unwrap(), 0x5a);
        assert_eq!(file.stats().unwrap().first_faults, 1);
    }

    #[test]
    fn test_mmap_rejects_oversize_and_zero() {
        let device = device();
        let file = device.open();
        let space = AddressSpace::new();
        assert!(matches!(
            file.mmap(&space, DEVICE_SIZE + 1, AccessMode::SHARED_RW),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            file.mmap(&space, 0, AccessMode::SHARED_RW),
            Err(Error::InvalidArgument(_))
        ));
        assert!(file.range().is_none());
    }

    #[test]
    fn test_unknown_ioctl() {
        let device = device();
        let file = device.open();
        let space = AddressSpace::new();
        assert_eq!(
            file.ioctl(&space, 0x1234, &[]).unwrap_err(),
            Error::NotSupported(0x1234)
        );
    }

    #[test]
    fn test_mmap_after_release() {
        let device = device();
        let file = device.open();
        let space = AddressSpace::new();
        file.mmap(&space, PAGE_SIZE, AccessMode::SHARED_RW).unwrap();
        file.release();
        assert_eq!(
            file.mmap(&space, PAGE_SIZE, AccessMode::SHARED_RW).unwrap_err(),
            Error::Closed
        );
    }
}
