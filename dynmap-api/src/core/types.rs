//! Core types: page geometry, page indices, frame numbers and access modes

use ::core::fmt;

use bitflags::bitflags;
use static_assertions::const_assert;

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;
/// Page shift (log2 of PAGE_SIZE)
pub const PAGE_SHIFT: usize = 12;

/// Default size of a managed range: 16 pages of virtual space
pub const DEVICE_SIZE: usize = 16 * PAGE_SIZE;

/// Default number of pages in a managed range
pub const DEVICE_PAGES: usize = DEVICE_SIZE / PAGE_SIZE;

const_assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
const_assert!(DEVICE_SIZE % PAGE_SIZE == 0);
const_assert!(DEVICE_PAGES > 0);

/// Index of a page within a managed range (`offset / PAGE_SIZE`)
pub type PageIndex = usize;

/// Page index for a byte offset within a range
#[inline]
pub const fn page_index(offset: usize) -> PageIndex {
    offset >> PAGE_SHIFT
}

/// Align address down to page boundary
#[inline]
pub const fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Align address up to page boundary
#[inline]
pub const fn page_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Align address up to page boundary, or `None` if that overflows
#[inline]
pub const fn checked_page_round_up(addr: usize) -> Option<usize> {
    match addr.checked_add(PAGE_SIZE - 1) {
        Some(end) => Some(end & !(PAGE_SIZE - 1)),
        None => None,
    }
}

/// Check if a size or address is page aligned
#[inline]
pub const fn is_page_aligned(addr: usize) -> bool {
    addr & (PAGE_SIZE - 1) == 0
}

/// Byte every cell of a freshly faulted frame is filled with
#[inline]
pub const fn fill_byte(index: PageIndex) -> u8 {
    (index & 0xff) as u8
}

/// Number identifying a backing frame handed out by a frame allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FrameNumber(pub usize);

impl FrameNumber {
    /// Creates a frame number from its raw value.
    pub const fn new(pfn: usize) -> Self {
        Self(pfn)
    }

    /// Returns the raw frame number.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Physical address of the first byte of this frame.
    pub const fn phys_addr(self) -> usize {
        self.0 << PAGE_SHIFT
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pfn:{:#x}", self.0)
    }
}

bitflags! {
    /// Access granted by a mapping or a page-table entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMode: u32 {
        /// Pages may be read
        const READ = 0x1;
        /// Pages may be written
        const WRITE = 0x2;
        /// Pages are shared with every other mapping of the same frame
        const SHARED = 0x8;

        /// `PROT_READ | PROT_WRITE` with `MAP_SHARED`
        const SHARED_RW = Self::READ.bits() | Self::WRITE.bits() | Self::SHARED.bits();
    }
}

impl AccessMode {
    /// Returns true if reads are allowed
    pub const fn readable(self) -> bool {
        self.contains(Self::READ)
    }

    /// Returns true if writes are allowed
    pub const fn writable(self) -> bool {
        self.contains(Self::WRITE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_helpers() {
        assert_eq!(page_index(0), 0);
        assert_eq!(page_index(PAGE_SIZE - 1), 0);
        assert_eq!(page_index(PAGE_SIZE), 1);
        assert_eq!(page_round_down(PAGE_SIZE + 17), PAGE_SIZE);
        assert_eq!(page_round_up(PAGE_SIZE + 17), 2 * PAGE_SIZE);
        assert!(is_page_aligned(3 * PAGE_SIZE));
        assert!(!is_page_aligned(3 * PAGE_SIZE + 1));
    }

    #[test]
    fn test_checked_round_up() {
        assert_eq!(checked_page_round_up(1), Some(PAGE_SIZE));
        assert_eq!(checked_page_round_up(PAGE_SIZE), Some(PAGE_SIZE));
        assert_eq!(checked_page_round_up(usize::MAX), None);
        assert_eq!(checked_page_round_up(usize::MAX - PAGE_SIZE + 2), None);
        assert_eq!(
            checked_page_round_up(usize::MAX - PAGE_SIZE + 1),
            Some(usize::MAX - PAGE_SIZE + 1)
        );
    }

    #[test]
    fn test_fill_byte_wraps() {
        assert_eq!(fill_byte(0), 0);
        assert_eq!(fill_byte(15), 15);
        assert_eq!(fill_byte(256), 0);
        assert_eq!(fill_byte(257), 1);
    }

    #[test]
    fn test_access_mode() {
        assert!(AccessMode::SHARED_RW.readable());
        assert!(AccessMode::SHARED_RW.writable());
        assert!(!AccessMode::READ.writable());
    }

    #[test]
    fn test_frame_number_phys_addr() {
        assert_eq!(FrameNumber::new(3).phys_addr(), 3 * PAGE_SIZE);
    }
}
