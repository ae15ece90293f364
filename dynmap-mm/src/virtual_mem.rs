//! Virtual addresses within a consumer's address space

use core::fmt;

use dynmap_api::{page_round_down, PAGE_SHIFT, PAGE_SIZE};

/// A virtual address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(pub usize);

impl VirtAddr {
    /// Creates a new virtual address from a raw usize value.
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Returns the virtual address as a raw usize value.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns the offset within the current page.
    pub const fn page_offset(self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Returns the page number for this virtual address.
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Returns the address of the first byte of the containing page.
    pub const fn page_base(self) -> Self {
        Self(page_round_down(self.0))
    }

    /// Adds a byte offset, failing on overflow.
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Byte distance from `base`, if this address is not below it.
    pub const fn offset_from(self, base: VirtAddr) -> Option<usize> {
        self.0.checked_sub(base.0)
    }
}

impl From<usize> for VirtAddr {
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

impl From<VirtAddr> for usize {
    fn from(addr: VirtAddr) -> Self {
        addr.0
    }
}

impl fmt::LowerHex for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
