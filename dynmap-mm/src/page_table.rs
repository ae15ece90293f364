//! Page-table collaborator interface
//!
//! The core never touches hardware page tables. It needs four primitives
//! from the OS side, expressed by [`PageTable`]; [`SoftPageTable`] is an
//! in-memory implementation used by the simulated address space and by
//! tests.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::ops::Range;

use dynmap_api::{AccessMode, Error, Result};

use crate::frame::Frame;
use crate::virtual_mem::VirtAddr;

/// Trait for the live page table of one address space
///
/// Implementations index entries by page: every address within a page
/// names the same entry.
pub trait PageTable {
    /// Checks that `addr` lies inside a live mapping of the address space
    fn validate(&self, addr: VirtAddr) -> Result<()>;

    /// New handle on the frame currently installed for the page containing `addr`
    fn translate(&self, addr: VirtAddr) -> Option<Frame>;

    /// Installs `frame` for the page containing `addr`
    ///
    /// Fails if the page already has an entry. Implementations that track
    /// per-mapping protection install `mode` narrowed to it.
    fn map_page(&mut self, addr: VirtAddr, frame: Frame, mode: AccessMode) -> Result<()>;

    /// Removes the entry for the page containing `addr`, handing back its
    /// frame reference. Removing an absent entry is a no-op.
    fn unmap_page(&mut self, addr: VirtAddr) -> Option<Frame>;
}

/// A single installed translation
#[derive(Debug, Clone)]
pub struct PageTableEntry {
    frame: Frame,
    mode: AccessMode,
}

impl PageTableEntry {
    /// Frame the entry points at
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Access granted through the entry
    pub fn mode(&self) -> AccessMode {
        self.mode
    }
}

/// In-memory page table keyed by page base address
#[derive(Debug, Default)]
pub struct SoftPageTable {
    entries: BTreeMap<VirtAddr, PageTableEntry>,
    window: Option<Range<usize>>,
}

impl SoftPageTable {
    /// Page table accepting every address
    pub fn new() -> Self {
        Self::default()
    }

    /// Page table accepting only addresses inside `window`
    pub fn with_window(window: Range<usize>) -> Self {
        Self {
            entries: BTreeMap::new(),
            window: Some(window),
        }
    }

    /// Entry for the page containing `addr`
    pub fn entry(&self, addr: VirtAddr) -> Option<&PageTableEntry> {
        self.entries.get(&addr.page_base())
    }

    /// Number of installed entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entry is installed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Page base addresses with an installed entry, ascending
    pub fn mapped_pages(&self) -> Vec<VirtAddr> {
        self.entries.keys().copied().collect()
    }

    /// Removes every entry whose page lies in `range`, handing back their
    /// frame references
    pub fn unmap_range(&mut self, range: Range<usize>) -> Vec<Frame> {
        let pages: Vec<VirtAddr> = self
            .entries
            .range(VirtAddr::new(range.start)..VirtAddr::new(range.end))
            .map(|(page, _)| *page)
            .collect();
        pages
            .into_iter()
            .filter_map(|page| self.entries.remove(&page))
            .map(|entry| entry.frame)
            .collect()
    }
}

impl PageTable for SoftPageTable {
    fn validate(&self, addr: VirtAddr) -> Result<()> {
        match &self.window {
            Some(window) if !window.contains(&addr.as_usize()) => Err(Error::OutOfRange {
                offset: addr.as_usize(),
                limit: window.end,
            }),
            _ => Ok(()),
        }
    }

    fn translate(&self, addr: VirtAddr) -> Option<Frame> {
        self.entry(addr).map(|entry| entry.frame.clone())
    }

    fn map_page(&mut self, addr: VirtAddr, frame: Frame, mode: AccessMode) -> Result<()> {
        self.validate(addr)?;
        let page = addr.page_base();
        if self.entries.contains_key(&page) {
            return Err(Error::InvalidArgument("page already has a translation"));
        }
        self.entries.insert(page, PageTableEntry { frame, mode });
        Ok(())
    }

    fn unmap_page(&mut self, addr: VirtAddr) -> Option<Frame> {
        self.entries
            .remove(&addr.page_base())
            .map(|entry| entry.frame)
    }
}
