//! Error handling module for dynmap

use core::fmt;

/// Common error type used throughout dynmap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Offset or size outside the managed range
    OutOfRange {
        /// Offending offset, size or address
        offset: usize,
        /// Exclusive upper bound that was exceeded
        limit: usize,
    },
    /// Frame allocator exhausted
    OutOfMemory,
    /// Remap source has no live page-table entry
    NotMapped {
        /// Virtual address of the source page
        addr: usize,
    },
    /// Managed range has already been torn down
    Closed,
    /// Invalid argument
    InvalidArgument(&'static str),
    /// Control command not understood by the device
    NotSupported(u32),
    /// Access not permitted by the page-table entry
    PermissionDenied {
        /// Faulting virtual address
        addr: usize,
    },
    /// Access outside every mapping of the address space
    SegFault {
        /// Faulting virtual address
        addr: usize,
    },
}

/// `EACCES`
pub const EACCES: i32 = 13;
/// `EFAULT`
pub const EFAULT: i32 = 14;
/// `EBADF`
pub const EBADF: i32 = 9;
/// `EINVAL`
pub const EINVAL: i32 = 22;
/// `ENOMEM`
pub const ENOMEM: i32 = 12;
/// `ENOTTY`
pub const ENOTTY: i32 = 25;

impl Error {
    /// Negative errno reported through the device surface
    pub const fn errno(&self) -> i32 {
        match self {
            Error::OutOfRange { .. } | Error::InvalidArgument(_) => -EINVAL,
            Error::OutOfMemory => -ENOMEM,
            Error::NotMapped { .. } | Error::SegFault { .. } => -EFAULT,
            Error::Closed => -EBADF,
            Error::NotSupported(_) => -ENOTTY,
            Error::PermissionDenied { .. } => -EACCES,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfRange { offset, limit } => {
                write!(f, "Out of range: {:#x} not below {:#x}", offset, limit)
            }
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::NotMapped { addr } => write!(f, "Not mapped: {:#x}", addr),
            Error::Closed => write!(f, "Managed range closed"),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::NotSupported(cmd) => write!(f, "Unsupported command: {:#x}", cmd),
            Error::PermissionDenied { addr } => write!(f, "Permission denied: {:#x}", addr),
            Error::SegFault { addr } => write!(f, "Segmentation fault at {:#x}", addr),
        }
    }
}

impl core::error::Error for Error {}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;

/// Signal the OS collaborator raises when a fault cannot be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmFault {
    /// Bus error delivered to the faulting process
    SigBus,
    /// Out-of-memory delivered to the faulting process
    Oom,
}

impl From<Error> for VmFault {
    fn from(err: Error) -> Self {
        match err {
            Error::OutOfMemory => VmFault::Oom,
            _ => VmFault::SigBus,
        }
    }
}

impl fmt::Display for VmFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmFault::SigBus => write!(f, "SIGBUS"),
            VmFault::Oom => write!(f, "OOM"),
        }
    }
}
