//! Global NoC addresses.
//!
//! A global address names a byte in some tile's memory: the upper byte holds
//! `0x80 + tile`, the lower 56 bits hold the offset inside that tile.

use core::fmt;

use crate::{AbiError, Result};

/// NoC tile identifier.
pub type TileId = u8;

pub const TILE_SHIFT: u32 = 56;
pub const TILE_PREFIX: u64 = 0x80;
pub const OFFSET_MASK: u64 = (1 << TILE_SHIFT) - 1;
/// Tiles that can be encoded after the `0x80` prefix.
pub const MAX_TILES: u8 = 0x80;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobAddr(u64);

impl GlobAddr {
    pub fn new(tile: TileId, offset: u64) -> Result<Self> {
        if tile >= MAX_TILES {
            return Err(AbiError::TileOutOfRange(tile));
        }
        if offset & !OFFSET_MASK != 0 {
            return Err(AbiError::OffsetOutOfRange(offset));
        }
        Ok(Self((TILE_PREFIX + tile as u64) << TILE_SHIFT | offset))
    }

    pub fn from_raw(raw: u64) -> Result<Self> {
        if raw >> 63 == 0 {
            return Err(AbiError::NotGlobal(raw));
        }
        Ok(Self(raw))
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn tile(self) -> TileId {
        ((self.0 >> TILE_SHIFT) - TILE_PREFIX) as TileId
    }

    #[inline]
    pub fn offset(self) -> u64 {
        self.0 & OFFSET_MASK
    }
}

impl fmt::Debug for GlobAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G[T{}+{:#x}]", self.tile(), self.offset())
    }
}

impl fmt::Display for GlobAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
