//! Control command encoding
//!
//! Commands use the conventional 32-bit layout: direction in the top two
//! bits, then a 14-bit argument size, an 8-bit type (magic) and an 8-bit
//! sequence number.

use core::mem::size_of;

use dynmap_api::{Error, Result};
use dynmap_mm::VirtAddr;
use static_assertions::const_assert_eq;

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;

/// No data transferred
pub const IOC_NONE: u32 = 0;
/// Caller writes data to the device
pub const IOC_WRITE: u32 = 1;
/// Caller reads data from the device
pub const IOC_READ: u32 = 2;

/// Build a command number
pub const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> u32 {
    (dir << IOC_DIRSHIFT)
        | ((ty as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
        | (((size as u32) & ((1 << IOC_SIZEBITS) - 1)) << IOC_SIZESHIFT)
}

/// Command that passes an argument of `size` bytes to the device
pub const fn iow(ty: u8, nr: u8, size: usize) -> u32 {
    ioc(IOC_WRITE, ty, nr, size)
}

/// Direction bits of a command
pub const fn ioc_dir(cmd: u32) -> u32 {
    cmd >> IOC_DIRSHIFT
}

/// Type (magic) byte of a command
pub const fn ioc_type(cmd: u32) -> u8 {
    (cmd >> IOC_TYPESHIFT) as u8
}

/// Sequence number of a command
pub const fn ioc_nr(cmd: u32) -> u8 {
    (cmd >> IOC_NRSHIFT) as u8
}

/// Argument size encoded in a command
pub const fn ioc_size(cmd: u32) -> usize {
    ((cmd >> IOC_SIZESHIFT) & ((1 << IOC_SIZEBITS) - 1)) as usize
}

/// Magic byte shared by every dynmap command
pub const DYNMAP_IOC_MAGIC: u8 = b'd';

/// Remap one page onto another; the argument is a [`RemapArgs`]
///
/// The encoded size is that of an unsigned long, matching the value
/// existing consumers were built against.
pub const DYNMAP_IOC_REMAP: u32 = iow(DYNMAP_IOC_MAGIC, 1, size_of::<u64>());

const_assert_eq!(DYNMAP_IOC_REMAP, 0x4008_6401);

/// Argument of [`DYNMAP_IOC_REMAP`]
///
/// The page containing `addr` is the source; the page containing
/// `addr + offset` is the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct RemapArgs {
    /// Source address
    pub addr: u64,
    /// Byte distance from source to destination
    pub offset: u64,
}

const_assert_eq!(size_of::<RemapArgs>(), RemapArgs::SIZE);

impl RemapArgs {
    /// Size of the encoded argument in bytes
    pub const SIZE: usize = 16;

    /// Create an argument block
    pub const fn new(addr: u64, offset: u64) -> Self {
        Self { addr, offset }
    }

    /// Decode from native-endian bytes as a consumer would lay them out
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; Self::SIZE] = bytes
            .get(..Self::SIZE)
            .and_then(|head| head.try_into().ok())
            .ok_or(Error::InvalidArgument("remap argument too short"))?;
        let (addr, offset) = bytes.split_at(8);
        let addr: [u8; 8] = addr
            .try_into()
            .map_err(|_| Error::InvalidArgument("remap argument too short"))?;
        let offset: [u8; 8] = offset
            .try_into()
            .map_err(|_| Error::InvalidArgument("remap argument too short"))?;
        Ok(Self {
            addr: u64::from_ne_bytes(addr),
            offset: u64::from_ne_bytes(offset),
        })
    }

    /// Encode to native-endian bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..8].copy_from_slice(&self.addr.to_ne_bytes());
        out[8..].copy_from_slice(&self.offset.to_ne_bytes());
        out
    }

    /// Source and destination addresses
    ///
    /// # Errors
    ///
    /// `OutOfRange` if the destination overflows the address width.
    pub fn endpoints(&self) -> Result<(VirtAddr, VirtAddr)> {
        let overflow = Error::OutOfRange {
            offset: usize::try_from(self.offset).unwrap_or(usize::MAX),
            limit: usize::MAX,
        };
        let from = usize::try_from(self.addr).map_err(|_| overflow)?;
        let offset = usize::try_from(self.offset).map_err(|_| overflow)?;
        let to = from.checked_add(offset).ok_or(overflow)?;
        Ok((VirtAddr::new(from), VirtAddr::new(to)))
    }
}
