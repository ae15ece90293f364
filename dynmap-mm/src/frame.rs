//! Backing frame ownership
//!
//! A [`Frame`] is a shared-ownership handle on one page of backing memory.
//! Every clone is one reference and every drop releases exactly that
//! reference. The frame table holds one handle per recorded index and every
//! live page-table entry holds one more. When the last handle goes away the
//! raw frame is handed back to the allocator that produced it, once.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::mem;

use dynmap_api::sync::RwLock;
use dynmap_api::{FrameAllocator, FrameNumber, RawFrame, PAGE_SIZE};

struct FrameInner {
    number: FrameNumber,
    memory: RwLock<Box<[u8]>>,
    allocator: Arc<dyn FrameAllocator>,
}

impl Drop for FrameInner {
    fn drop(&mut self) {
        let memory = mem::take(self.memory.get_mut());
        mm_trace!("dynmap: releasing frame {}", self.number);
        self.allocator
            .release(RawFrame::from_parts(self.number, memory));
    }
}

/// Reference-counted handle on a backing frame
#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

impl Frame {
    /// Takes ownership of a raw frame; the frame goes back to `allocator`
    /// when the last handle is dropped.
    pub fn new(raw: RawFrame, allocator: Arc<dyn FrameAllocator>) -> Self {
        let (number, memory) = raw.into_parts();
        Self {
            inner: Arc::new(FrameInner {
                number,
                memory: RwLock::new(memory),
                allocator,
            }),
        }
    }

    /// Frame number assigned by the allocator
    pub fn number(&self) -> FrameNumber {
        self.inner.number
    }

    /// Number of live handles, table and page-table references included
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// True if both handles refer to the same backing frame
    pub fn same_frame(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Reads the byte at `offset` within the frame.
    ///
    /// # Panics
    ///
    /// Panics if `offset >= PAGE_SIZE`.
    pub fn read_byte(&self, offset: usize) -> u8 {
        self.inner.memory.read()[offset]
    }

    /// Writes the byte at `offset` within the frame.
    ///
    /// # Panics
    ///
    /// Panics if `offset >= PAGE_SIZE`.
    pub fn write_byte(&self, offset: usize, value: u8) {
        self.inner.memory.write()[offset] = value;
    }

    /// Sets every byte of the frame to `value`
    pub fn fill(&self, value: u8) {
        self.inner.memory.write().fill(value);
    }

    /// Copies the frame contents out
    pub fn to_vec(&self) -> Vec<u8> {
        self.inner.memory.read().to_vec()
    }

    /// Size of the frame in bytes
    pub const fn size(&self) -> usize {
        PAGE_SIZE
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("number", &self.inner.number)
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::pool::FramePool;

    #[test]
    fn test_last_handle_releases() {
        let pool = Arc::new(FramePool::with_capacity(4));
        let raw = pool.allocate().unwrap();
        let frame = Frame::new(raw, pool.clone());
        let alias = frame.clone();
        assert_eq!(frame.ref_count(), 2);
        assert!(frame.same_frame(&alias));

        drop(frame);
        assert_eq!(pool.stats().releases, 0);
        assert_eq!(alias.ref_count(), 1);

        drop(alias);
        assert_eq!(pool.stats().releases, 1);
        assert_eq!(pool.stats().in_use, 0);
    }

    #[test]
    fn test_contents_shared_between_handles() {
        let pool = Arc::new(FramePool::with_capacity(1));
        let frame = Frame::new(pool.allocate().unwrap(), pool.clone());
        let alias = frame.clone();
        frame.fill(0x5a);
        alias.write_byte(7, 0x11);
        assert_eq!(frame.read_byte(0), 0x5a);
        assert_eq!(frame.read_byte(7), 0x11);
        assert_eq!(alias.to_vec().len(), PAGE_SIZE);
    }
}
