//! Frame allocator interface

use alloc::boxed::Box;
use alloc::vec;

use crate::core::types::{FrameNumber, PAGE_SIZE};
use crate::error::Result;

/// A backing frame as handed out by an allocator, before any ownership
/// bookkeeping is attached to it.
#[derive(Debug)]
pub struct RawFrame {
    number: FrameNumber,
    memory: Box<[u8]>,
}

impl RawFrame {
    /// Creates a zero-filled frame with the given number
    pub fn zeroed(number: FrameNumber) -> Self {
        Self {
            number,
            memory: vec![0u8; PAGE_SIZE].into_boxed_slice(),
        }
    }

    /// Frame number assigned by the allocator
    pub fn number(&self) -> FrameNumber {
        self.number
    }

    /// Frame contents
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Mutable frame contents
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Splits the frame into its number and backing memory
    pub fn into_parts(self) -> (FrameNumber, Box<[u8]>) {
        (self.number, self.memory)
    }

    /// Reassembles a frame from its parts
    pub fn from_parts(number: FrameNumber, memory: Box<[u8]>) -> Self {
        Self { number, memory }
    }
}

/// Trait for the frame allocator collaborator
///
/// Allocation may block while the implementation waits for memory; the
/// caller does not distinguish that from an immediate answer.
pub trait FrameAllocator: Send + Sync {
    /// Allocates one page-sized frame
    fn allocate(&self) -> Result<RawFrame>;

    /// Returns a frame to the allocator
    fn release(&self, frame: RawFrame);
}
