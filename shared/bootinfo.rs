//! Boot-info table ("kenv"), read by the bootstrap tile at start-up.
//!
//! Layout at the table base (little-endian):
//!
//! ```text
//!   +--------------------------+ 0
//!   | BootInfoHeader           | 32
//!   +--------------------------+
//!   | ModDesc x mod_count      | 80 each
//!   +--------------------------+
//!   | PE descriptor x pe_count | 8 each
//!   +--------------------------+
//!   | MemDesc x mem_count      | 16 each
//!   +--------------------------+
//! ```

use core::mem::size_of;

use zerocopy::byteorder::{LittleEndian, U64};
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned};

use crate::glob::GlobAddr;
use crate::{AbiError, Result};

pub type Le64 = U64<LittleEndian>;

/// Name buffer of a module descriptor, including the terminating NUL.
pub const MOD_NAME_LEN: usize = 64;

#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned, Clone, Copy, Debug)]
pub struct BootInfoHeader {
    pub mod_count: Le64,
    pub pe_count: Le64,
    pub mem_count: Le64,
    pub serv_count: Le64,
}

impl BootInfoHeader {
    pub const SIZE: u64 = size_of::<Self>() as u64;

    pub fn new(mod_count: u64, pe_count: u64, mem_count: u64) -> Self {
        Self {
            mod_count: Le64::new(mod_count),
            pe_count: Le64::new(pe_count),
            mem_count: Le64::new(mem_count),
            serv_count: Le64::new(0),
        }
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        parse_record(bytes)
    }
}

#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned, Clone, Copy, Debug)]
pub struct ModDesc {
    pub addr: Le64,
    pub size: Le64,
    pub name: [u8; MOD_NAME_LEN],
}

impl ModDesc {
    pub const SIZE: u64 = size_of::<Self>() as u64;

    pub fn new(addr: GlobAddr, size: u64, name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.len() >= MOD_NAME_LEN {
            return Err(AbiError::NameTooLong { name: name.into() });
        }
        let mut buf = [0u8; MOD_NAME_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            addr: Le64::new(addr.raw()),
            size: Le64::new(size),
            name: buf,
        })
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        parse_record(bytes)
    }

    /// Name up to the first NUL; `None` if it is not valid UTF-8.
    pub fn name(&self) -> Option<&str> {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(MOD_NAME_LEN);
        core::str::from_utf8(&self.name[..end]).ok()
    }
}

#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned, Clone, Copy, Debug)]
pub struct MemDesc {
    pub addr: Le64,
    pub size: Le64,
}

impl MemDesc {
    pub const SIZE: u64 = size_of::<Self>() as u64;

    pub fn new(addr: u64, size: u64) -> Self {
        Self { addr: Le64::new(addr), size: Le64::new(size) }
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        parse_record(bytes)
    }
}

pub(crate) fn parse_record<T: FromBytes + Unaligned + Copy>(bytes: &[u8]) -> Option<T> {
    let bytes = bytes.get(..size_of::<T>())?;
    LayoutVerified::<_, T>::new_unaligned(bytes).map(|rec| *rec)
}
