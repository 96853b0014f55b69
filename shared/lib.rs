//! tileboot boot ABI
//!
//! Everything the host writes into shared memory before a tile starts, in the
//! exact byte layout the on-tile runtime expects. All multi-byte values are
//! little-endian. Nothing in this crate performs I/O; the host loader decides
//! where the encoded bytes go.

pub mod bootinfo;
pub mod env;
pub mod glob;
pub mod layout;
pub mod pedesc;

pub use bootinfo::{BootInfoHeader, MemDesc, ModDesc, MOD_NAME_LEN};
pub use env::{ArgRegion, EnvBlock};
pub use glob::{GlobAddr, TileId};
pub use layout::Layout;
pub use pedesc::{PeDesc, PeIsa, PeType};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("tile {0} does not fit the global address prefix (max {max})", max = glob::MAX_TILES - 1)]
    TileOutOfRange(TileId),

    #[error("offset {0:#x} exceeds the 56-bit global offset range")]
    OffsetOutOfRange(u64),

    #[error("{0:#018x} is not a global address")]
    NotGlobal(u64),

    #[error("unknown PE type {0}")]
    UnknownPeType(u64),

    #[error("unknown PE ISA {0}")]
    UnknownPeIsa(u64),

    #[error("PE memory size {0:#x} is not page-aligned")]
    UnalignedMemSize(u64),

    #[error("reserved PE descriptor bits set in {0:#x}")]
    ReservedBits(u64),

    #[error("module name '{name}' is longer than {max} bytes", max = MOD_NAME_LEN - 1)]
    NameTooLong { name: String },

    #[error("arguments need {needed} bytes, only {capacity} available")]
    ArgumentOverflow { needed: u64, capacity: u64 },

    #[error("invalid layout: {0}")]
    Layout(&'static str),
}

pub type Result<T> = std::result::Result<T, AbiError>;

/// Rounds `value` up to the next multiple of `align` (a power of two).
#[inline]
pub const fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}
