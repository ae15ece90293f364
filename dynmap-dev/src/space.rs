//! Simulated consumer address space
//!
//! An [`AddressSpace`] owns the mappings a consumer has created and the
//! page table that backs them. All page-table changes happen under one
//! coarse lock. Faults resolve their frame with the lock dropped and take
//! it again only to install the translation, re-checking that nothing else
//! installed the page in between.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;

use dynmap_api::sync::Mutex;
use dynmap_api::{checked_page_round_up, page_round_down, AccessMode, Error, Result, VmFault};
use dynmap_mm::{
    mm_debug, mm_warn, remap, Frame, ManagedRange, PageTable, SoftPageTable, VirtAddr,
};

/// Lowest address handed out for new mappings
pub const MMAP_BASE: usize = 0x1000_0000;

/// One mapping of a managed range into the address space
#[derive(Clone)]
pub struct VmArea {
    range: Range<usize>,
    prot: AccessMode,
    backing: Arc<ManagedRange>,
}

impl VmArea {
    /// First address of the mapping
    pub fn start(&self) -> VirtAddr {
        VirtAddr::new(self.range.start)
    }

    /// Length in bytes, always a whole number of pages
    pub fn len(&self) -> usize {
        self.range.end - self.range.start
    }

    /// Returns true if the mapping covers no bytes
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Access the mapping was created with
    pub fn prot(&self) -> AccessMode {
        self.prot
    }

    /// Range the mapping faults from
    pub fn backing(&self) -> &Arc<ManagedRange> {
        &self.backing
    }

    fn contains(&self, addr: usize) -> bool {
        self.range.contains(&addr)
    }

    fn offset_of(&self, addr: usize) -> usize {
        addr - self.range.start
    }
}

impl fmt::Debug for VmArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmArea")
            .field("start", &format_args!("{:#x}", self.range.start))
            .field("end", &format_args!("{:#x}", self.range.end))
            .field("prot", &self.prot)
            .finish()
    }
}

struct SpaceInner {
    areas: BTreeMap<usize, VmArea>,
    ptes: SoftPageTable,
}

impl SpaceInner {
    fn overlap(range: &Range<usize>, other: &Range<usize>) -> bool {
        range.start < other.end && other.start < range.end
    }

    fn area(&self, addr: usize) -> Option<&VmArea> {
        self.areas
            .range(..=addr)
            .next_back()
            .map(|(_, area)| area)
            .filter(|area| area.contains(addr))
    }

    fn mapped_end(&self) -> usize {
        self.areas
            .values()
            .next_back()
            .map_or(MMAP_BASE, |area| area.range.end)
    }

    fn find_free_area(&self, length: usize) -> Option<usize> {
        let mut cursor = MMAP_BASE;
        for area in self.areas.values() {
            if cursor.checked_add(length)? <= area.range.start {
                return Some(cursor);
            }
            cursor = cursor.max(area.range.end);
        }
        cursor.checked_add(length).map(|_| cursor)
    }
}

impl PageTable for SpaceInner {
    fn validate(&self, addr: VirtAddr) -> Result<()> {
        match self.area(addr.as_usize()) {
            Some(_) => Ok(()),
            None => Err(Error::OutOfRange {
                offset: addr.as_usize(),
                limit: self.mapped_end(),
            }),
        }
    }

    fn translate(&self, addr: VirtAddr) -> Option<Frame> {
        self.ptes.translate(addr)
    }

    /// The installed access never exceeds the protection of the mapping
    /// that `addr` falls in.
    fn map_page(&mut self, addr: VirtAddr, frame: Frame, mode: AccessMode) -> Result<()> {
        let prot = match self.area(addr.as_usize()) {
            Some(area) => area.prot,
            None => return self.validate(addr),
        };
        self.ptes
            .map_page(addr, frame, mode & (prot | AccessMode::SHARED))
    }

    fn unmap_page(&mut self, addr: VirtAddr) -> Option<Frame> {
        self.ptes.unmap_page(addr)
    }
}

/// A consumer address space
pub struct AddressSpace {
    inner: Mutex<SpaceInner>,
}

impl AddressSpace {
    /// Empty address space
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SpaceInner {
                areas: BTreeMap::new(),
                ptes: SoftPageTable::new(),
            }),
        }
    }

    /// Map `length` bytes of `backing` at a free address.
    ///
    /// Nothing is faulted in; the returned mapping starts at offset zero of
    /// the range.
    pub fn mmap(
        &self,
        length: usize,
        prot: AccessMode,
        backing: Arc<ManagedRange>,
    ) -> Result<VirtAddr> {
        if length == 0 {
            return Err(Error::InvalidArgument("mapping length must be non-zero"));
        }
        let length = checked_page_round_up(length).ok_or(Error::OutOfRange {
            offset: length,
            limit: backing.limit(),
        })?;
        if length > backing.limit() {
            return Err(Error::OutOfRange {
                offset: length,
                limit: backing.limit(),
            });
        }

        let mut inner = self.inner.lock();
        let start = inner
            .find_free_area(length)
            .ok_or(Error::InvalidArgument("address space exhausted"))?;
        let range = start..start + length;
        if inner
            .areas
            .values()
            .any(|area| SpaceInner::overlap(&range, &area.range))
        {
            return Err(Error::InvalidArgument("mapping overlaps an existing area"));
        }
        inner.areas.insert(
            start,
            VmArea {
                range,
                prot,
                backing,
            },
        );
        mm_debug!("dynmap: mapped {:#x}..{:#x} {:?}", start, start + length, prot);
        Ok(VirtAddr::new(start))
    }

    /// Remove the mapping that starts at `addr` and spans `length` bytes.
    ///
    /// Every translation inside the mapping goes with it. Returns the number
    /// of translations removed.
    pub fn munmap(&self, addr: VirtAddr, length: usize) -> Result<usize> {
        let start = page_round_down(addr.as_usize());
        let end = checked_page_round_up(length)
            .and_then(|length| start.checked_add(length))
            .ok_or(Error::InvalidArgument("mapping length overflows"))?;
        let target = start..end;

        let (area, dropped) = {
            let mut inner = self.inner.lock();
            let key = inner
                .areas
                .iter()
                .find(|(_, area)| area.range == target)
                .map(|(key, _)| *key)
                .ok_or(Error::InvalidArgument("no mapping with that extent"))?;
            let area = inner.areas.remove(&key);
            let dropped = inner.ptes.unmap_range(target);
            (area, dropped)
        };
        let count = dropped.len();
        mm_debug!("dynmap: unmapped {:#x}..{:#x}, {} pages", start, end, count);
        drop(dropped);
        drop(area);
        Ok(count)
    }

    /// Drop the translations for `[addr, addr + length)` and keep the
    /// mappings, so the next access faults again. Returns the number of
    /// translations dropped.
    pub fn zap(&self, addr: VirtAddr, length: usize) -> Result<usize> {
        let start = page_round_down(addr.as_usize());
        let end = addr
            .as_usize()
            .checked_add(length)
            .and_then(checked_page_round_up)
            .ok_or(Error::InvalidArgument("zap length overflows"))?;
        let dropped = self.inner.lock().ptes.unmap_range(start..end);
        Ok(dropped.len())
    }

    /// Read the byte at `addr`, faulting its page in if needed
    pub fn read_byte(&self, addr: VirtAddr) -> Result<u8> {
        let frame = self.access(addr, false)?;
        Ok(frame.read_byte(addr.page_offset()))
    }

    /// Write the byte at `addr`, faulting its page in if needed
    pub fn write_byte(&self, addr: VirtAddr, value: u8) -> Result<()> {
        let frame = self.access(addr, true)?;
        frame.write_byte(addr.page_offset(), value);
        Ok(())
    }

    /// Remap the page containing `to` onto the frame behind `from`
    pub fn remap(&self, from: VirtAddr, to: VirtAddr) -> Result<()> {
        let mut inner = self.inner.lock();
        remap(&mut *inner, from, to)
    }

    /// Frame currently installed for the page containing `addr`
    pub fn translate(&self, addr: VirtAddr) -> Option<Frame> {
        self.inner.lock().ptes.translate(addr)
    }

    /// Page base addresses with an installed translation, ascending
    pub fn mapped_pages(&self) -> Vec<VirtAddr> {
        self.inner.lock().ptes.mapped_pages()
    }

    /// Snapshot of the current mappings, ascending by start address
    pub fn areas(&self) -> Vec<VmArea> {
        self.inner.lock().areas.values().cloned().collect()
    }

    /// Run `f` with the page table locked
    pub fn with_page_table<R>(&self, f: impl FnOnce(&mut dyn PageTable) -> R) -> R {
        let mut inner = self.inner.lock();
        f(&mut *inner)
    }

    fn check_access(addr: VirtAddr, mode: AccessMode, write: bool) -> Result<()> {
        let allowed = if write {
            mode.writable()
        } else {
            mode.readable()
        };
        if allowed {
            Ok(())
        } else {
            Err(Error::PermissionDenied {
                addr: addr.as_usize(),
            })
        }
    }

    fn access(&self, addr: VirtAddr, write: bool) -> Result<Frame> {
        let (backing, offset, prot) = {
            let inner = self.inner.lock();
            if let Some(entry) = inner.ptes.entry(addr) {
                Self::check_access(addr, entry.mode(), write)?;
                return Ok(entry.frame().clone());
            }
            let area = inner.area(addr.as_usize()).ok_or(Error::SegFault {
                addr: addr.as_usize(),
            })?;
            Self::check_access(addr, area.prot, write)?;
            (
                Arc::clone(&area.backing),
                area.offset_of(addr.as_usize()),
                area.prot,
            )
        };

        let frame = backing.resolve(offset).inspect_err(|err| {
            mm_warn!(
                "dynmap: {} at {} (offset {:#x}): {}",
                VmFault::from(*err),
                addr,
                offset,
                err
            );
        })?;

        let mut inner = self.inner.lock();
        if let Some(entry) = inner.ptes.entry(addr) {
            // installed by a concurrent fault or a remap while unlocked
            let mode = entry.mode();
            let current = entry.frame().clone();
            drop(inner);
            drop(frame);
            Self::check_access(addr, mode, write)?;
            return Ok(current);
        }
        let still_mapped = inner
            .area(addr.as_usize())
            .is_some_and(|area| Arc::ptr_eq(&area.backing, &backing));
        if !still_mapped {
            drop(inner);
            drop(frame);
            return Err(Error::SegFault {
                addr: addr.as_usize(),
            });
        }
        inner.ptes.map_page(addr, frame.clone(), prot)?;
        Ok(frame)
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AddressSpace")
            .field("areas", &inner.areas.len())
            .field("mapped_pages", &inner.ptes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynmap_api::{DEVICE_SIZE, PAGE_SIZE};
    use dynmap_mm::{FramePool, RangeConfig};

    fn backing(pool: &Arc<FramePool>) -> Arc<ManagedRange> {
        Arc::new(ManagedRange::open(DEVICE_SIZE, RangeConfig::default(), pool.clone()).unwrap())
    }

    #[test]
    fn test_mmap_places_areas_without_overlap() {
        let pool = Arc::new(FramePool::default());
        let space = AddressSpace::new();
        let a = space.mmap(4 * PAGE_SIZE, AccessMode::SHARED_RW, backing(&pool)).unwrap();
        let b = space.mmap(PAGE_SIZE + 1, AccessMode::SHARED_RW, backing(&pool)).unwrap();

        assert_eq!(a.as_usize(), MMAP_BASE);
        assert_eq!(b.as_usize(), MMAP_BASE + 4 * PAGE_SIZE);
        assert_eq!(space.areas()[1].len(), 2 * PAGE_SIZE);
    }

    #[test]
    fn test_mmap_larger_than_limit_fails() {
        let pool = Arc::new(FramePool::default());
        let space = AddressSpace::new();
        let err = space
            .mmap(DEVICE_SIZE + PAGE_SIZE, AccessMode::SHARED_RW, backing(&pool))
            .unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
        assert!(space.areas().is_empty());
    }

    #[test]
    fn test_read_faults_in_once() {
        let pool = Arc::new(FramePool::default());
        let range = backing(&pool);
        let space = AddressSpace::new();
        let base = space.mmap(DEVICE_SIZE, AccessMode::SHARED_RW, range.clone()).unwrap();

        let addr = base.checked_add(5 * PAGE_SIZE + 17).unwrap();
        assert_eq!(space.read_byte(addr).unwrap(), 5);
        assert_eq!(space.read_byte(addr).unwrap(), 5);
        assert_eq!(range.stats().first_faults, 1);
        assert_eq!(range.stats().refaults, 0);
        assert_eq!(space.mapped_pages(), alloc::vec![addr.page_base()]);
    }

    #[test]
    fn test_write_is_visible_through_translation() {
        let pool = Arc::new(FramePool::default());
        let space = AddressSpace::new();
        let base = space.mmap(DEVICE_SIZE, AccessMode::SHARED_RW, backing(&pool)).unwrap();

        space.write_byte(base, 0xaa).unwrap();
        assert_eq!(space.translate(base).unwrap().read_byte(0), 0xaa);
    }

    #[test]
    fn test_write_to_read_only_mapping_denied() {
        let pool = Arc::new(FramePool::default());
        let space = AddressSpace::new();
        let base = space.mmap(PAGE_SIZE, AccessMode::READ, backing(&pool)).unwrap();

        assert_eq!(
            space.write_byte(base, 1).unwrap_err(),
            Error::PermissionDenied { addr: base.as_usize() }
        );
        assert_eq!(space.read_byte(base).unwrap(), 0);
    }

    #[test]
    fn test_access_outside_mappings_segfaults() {
        let space = AddressSpace::new();
        let addr = VirtAddr::new(MMAP_BASE);
        assert_eq!(
            space.read_byte(addr).unwrap_err(),
            Error::SegFault { addr: MMAP_BASE }
        );
    }

    #[test]
    fn test_munmap_requires_exact_extent() {
        let pool = Arc::new(FramePool::default());
        let space = AddressSpace::new();
        let base = space.mmap(2 * PAGE_SIZE, AccessMode::SHARED_RW, backing(&pool)).unwrap();
        space.read_byte(base).unwrap();

        assert!(space.munmap(base, PAGE_SIZE).is_err());
        assert_eq!(space.munmap(base, 2 * PAGE_SIZE).unwrap(), 1);
        assert!(space.areas().is_empty());
        assert!(space.mapped_pages().is_empty());
    }

    #[test]
    fn test_zap_keeps_mapping() {
        let pool = Arc::new(FramePool::default());
        let range = backing(&pool);
        let space = AddressSpace::new();
        let base = space.mmap(DEVICE_SIZE, AccessMode::SHARED_RW, range.clone()).unwrap();
        space.read_byte(base).unwrap();

        assert_eq!(space.zap(base, DEVICE_SIZE).unwrap(), 1);
        assert_eq!(space.read_byte(base).unwrap(), 0);
        assert_eq!(range.stats().refaults, 1);
    }

    #[test]
    fn test_overflowing_lengths_rejected() {
        let pool = Arc::new(FramePool::default());
        let range = backing(&pool);
        let space = AddressSpace::new();
        let base = space.mmap(DEVICE_SIZE, AccessMode::SHARED_RW, range.clone()).unwrap();
        space.read_byte(base).unwrap();

        assert!(matches!(
            space.zap(base, usize::MAX),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            space.munmap(base, usize::MAX),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(
            space.mmap(usize::MAX, AccessMode::SHARED_RW, range).unwrap_err(),
            Error::OutOfRange { offset: usize::MAX, limit: DEVICE_SIZE }
        );

        assert_eq!(space.areas().len(), 1);
        assert_eq!(space.mapped_pages(), alloc::vec![base]);
    }

    #[test]
    fn test_install_clamped_to_mapping_prot() {
        let pool = Arc::new(FramePool::default());
        let space = AddressSpace::new();
        let rw = space.mmap(PAGE_SIZE, AccessMode::SHARED_RW, backing(&pool)).unwrap();
        let ro = space.mmap(PAGE_SIZE, AccessMode::READ, backing(&pool)).unwrap();
        space.read_byte(rw).unwrap();
        let frame = space.translate(rw).unwrap();

        space
            .with_page_table(|table| table.map_page(ro, frame, AccessMode::SHARED_RW))
            .unwrap();

        let mode = space.inner.lock().ptes.entry(ro).unwrap().mode();
        assert_eq!(mode, AccessMode::READ | AccessMode::SHARED);
        assert_eq!(space.read_byte(ro).unwrap(), 0);
        assert_eq!(
            space.write_byte(ro, 1).unwrap_err(),
            Error::PermissionDenied { addr: ro.as_usize() }
        );
    }

    #[test]
    fn test_closed_range_reports_fault() {
        let pool = Arc::new(FramePool::default());
        let range = backing(&pool);
        let space = AddressSpace::new();
        let base = space.mmap(DEVICE_SIZE, AccessMode::SHARED_RW, range.clone()).unwrap();
        range.close();

        assert_eq!(space.read_byte(base).unwrap_err(), Error::Closed);
        assert!(space.mapped_pages().is_empty());
    }
}
