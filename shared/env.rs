//! Per-tile environment block and argument region.
//!
//! The block sits at the tile-local `ENV` address. Its argument vector follows
//! at `ENV + ARGV_OFFSET`: a table of `argc` pointers, then the NUL-terminated
//! strings, each padded to 8 bytes. Nothing may extend past `ENV + ARGS_END`.

use core::mem::size_of;

use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::bootinfo::{parse_record, Le64};
use crate::glob::GlobAddr;
use crate::pedesc::PeDesc;
use crate::{align_up, AbiError, Result};

/// `platform` value for real hardware
pub const PLATFORM_HW: u64 = 1;
pub const ARGV_OFFSET: u64 = 0x400;
pub const ARGS_END: u64 = 0x800;

#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned, Clone, Copy, Debug)]
pub struct EnvBlock {
    pub platform: Le64,
    pub pe_id: Le64,
    pub pe_desc: Le64,
    pub argc: Le64,
    pub argv: Le64,
    pub heap_size: Le64,
    pub kenv: Le64,
    pub reserved: Le64,
}

impl EnvBlock {
    pub const SIZE: u64 = size_of::<Self>() as u64;

    pub fn hardware(
        pe_id: u64,
        pe_desc: PeDesc,
        argc: u64,
        argv: u64,
        heap_size: u64,
        kenv: Option<GlobAddr>,
    ) -> Self {
        Self {
            platform: Le64::new(PLATFORM_HW),
            pe_id: Le64::new(pe_id),
            pe_desc: Le64::new(pe_desc.pack()),
            argc: Le64::new(argc),
            argv: Le64::new(argv),
            heap_size: Le64::new(heap_size),
            kenv: Le64::new(kenv.map_or(0, GlobAddr::raw)),
            reserved: Le64::new(0),
        }
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        parse_record(bytes)
    }
}

/// Packed argument vector, ready to be copied to `base`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgRegion {
    base: u64,
    bytes: Vec<u8>,
}

impl ArgRegion {
    /// Packs `args` for placement at tile-local address `base`. The region
    /// must end at or before `limit`.
    pub fn pack<S: AsRef<str>>(base: u64, limit: u64, args: &[S]) -> Result<Self> {
        let table = args.len() as u64 * 8;
        let needed = args.iter().fold(table, |acc, a| {
            acc + align_up(a.as_ref().len() as u64 + 1, 8)
        });
        let capacity = limit.saturating_sub(base);
        if needed > capacity {
            return Err(AbiError::ArgumentOverflow { needed, capacity });
        }

        let mut bytes = Vec::with_capacity(needed as usize);
        let mut cursor = base + table;
        for arg in args {
            bytes.extend_from_slice(&cursor.to_le_bytes());
            cursor += align_up(arg.as_ref().len() as u64 + 1, 8);
        }
        for arg in args {
            let arg = arg.as_ref().as_bytes();
            let padded = align_up(arg.len() as u64 + 1, 8) as usize;
            bytes.extend_from_slice(arg);
            bytes.resize(bytes.len() + padded - arg.len(), 0);
        }
        Ok(Self { base, bytes })
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Tile-local address one past the last padded string.
    pub fn end(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
