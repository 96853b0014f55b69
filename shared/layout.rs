//! Shared-memory layout of the DRAM tile.
//!
//! ```text
//!   0                      filesystem image (max_fs_size)
//!   max_fs_size            tile 0 window (init_pmp_size)
//!   ...                    tile n-1 window
//!   info_start             boot-info table
//!   info_start + 0x1000    boot modules, each page-aligned
//!   info_start + kenv_size free memory handed to the kernel
//! ```
//!
//! Tiles see their window at `dram_off`; their environment lives at the
//! tile-local address `env_base`.

use serde::{Deserialize, Serialize};

use crate::bootinfo::MemDesc;
use crate::glob::{GlobAddr, TileId, MAX_TILES};
use crate::{align_up, AbiError, Result};

pub const PAGE_SIZE: u64 = 4096;
/// Distance between the table base and the first module.
pub const MODS_GAP: u64 = 0x1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Layout {
    /// Tile-local address at which each window starts
    pub dram_off: u64,
    /// Tile-local address of the environment block
    pub env_base: u64,
    /// NoC id of the shared DRAM tile
    pub mem_tile: TileId,
    /// Memory reported for tiles running without virtual memory
    pub pe_mem_size: u64,
    pub dram_size: u64,
    pub max_fs_size: u64,
    /// Reserved for the boot-info table and the modules
    pub kenv_size: u64,
    /// Per-tile window size
    pub init_pmp_size: u64,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            dram_off: 0x1000_0000,
            env_base: 0x1010_0000,
            mem_tile: 8,
            pe_mem_size: 2 * 1024 * 1024,
            dram_size: 2 * 1024 * 1024 * 1024,
            max_fs_size: 256 * 1024 * 1024,
            kenv_size: 16 * 1024 * 1024,
            init_pmp_size: 8 * 1024 * 1024,
        }
    }
}

impl Layout {
    /// Checks that every offset derived for `pe_count` tiles stays in range.
    /// The other methods assume a validated layout.
    pub fn validate(&self, pe_count: usize) -> Result<()> {
        if self.mem_tile >= MAX_TILES {
            return Err(AbiError::TileOutOfRange(self.mem_tile));
        }
        if self.env_base < self.dram_off {
            return Err(AbiError::Layout("env_base below dram_off"));
        }
        let env_end = self.env_base - self.dram_off + crate::env::ARGS_END;
        if env_end > self.init_pmp_size {
            return Err(AbiError::Layout("environment outside the tile window"));
        }
        for size in [self.max_fs_size, self.init_pmp_size, self.kenv_size, self.pe_mem_size] {
            if size % PAGE_SIZE != 0 {
                return Err(AbiError::Layout("sizes must be page-aligned"));
            }
        }
        if self.kenv_size <= MODS_GAP {
            return Err(AbiError::Layout("kenv_size leaves no room for modules"));
        }
        let end = (pe_count as u64)
            .checked_mul(self.init_pmp_size)
            .and_then(|w| w.checked_add(self.max_fs_size))
            .and_then(|s| s.checked_add(self.kenv_size))
            .ok_or(AbiError::Layout("layout overflows 64 bits"))?;
        if end > self.dram_size {
            return Err(AbiError::Layout("DRAM too small for the reserved area"));
        }
        GlobAddr::new(self.mem_tile, end).map(|_| ())
    }

    pub fn info_start(&self, pe_count: usize) -> u64 {
        self.max_fs_size + pe_count as u64 * self.init_pmp_size
    }

    pub fn kenv_offset(&self, pe_count: usize) -> u64 {
        self.info_start(pe_count)
    }

    pub fn mods_base(&self, pe_count: usize) -> u64 {
        self.info_start(pe_count) + MODS_GAP
    }

    /// Where the module after one of `size` bytes placed at `addr` goes.
    pub fn next_module(addr: u64, size: u64) -> u64 {
        align_up(addr + size, PAGE_SIZE)
    }

    /// End of the area modules may occupy.
    pub fn mods_limit(&self, pe_count: usize) -> u64 {
        self.info_start(pe_count) + self.kenv_size
    }

    /// DRAM offset of tile `pe`'s window.
    pub fn pe_window(&self, pe: usize) -> u64 {
        self.max_fs_size + pe as u64 * self.init_pmp_size
    }

    /// Translates the tile-local `addr` of tile `pe` to a DRAM offset.
    /// `None` if the address lies outside the tile's window.
    pub fn core_to_dram(&self, pe: usize, addr: u64) -> Option<u64> {
        let rel = addr.checked_sub(self.dram_off)?;
        (rel < self.init_pmp_size).then(|| self.pe_window(pe) + rel)
    }

    /// DRAM offset of tile `pe`'s environment block.
    pub fn env_offset(&self, pe: usize) -> u64 {
        self.env_base - self.dram_off + self.pe_window(pe)
    }

    /// The memory left over for the kernel once everything is placed.
    pub fn free_memory(&self, pe_count: usize) -> MemDesc {
        let start = self.info_start(pe_count) + self.kenv_size;
        MemDesc::new(start, self.dram_size - start)
    }

    /// Global address of the boot-info table.
    pub fn kenv_address(&self, pe_count: usize) -> Result<GlobAddr> {
        GlobAddr::new(self.mem_tile, self.kenv_offset(pe_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_layout_offsets() {
        let l = Layout::default();
        l.validate(8).unwrap();
        assert_eq!(l.info_start(3), 256 * 1024 * 1024 + 3 * 8 * 1024 * 1024);
        assert_eq!(l.mods_base(3), l.info_start(3) + 0x1000);
        assert_eq!(l.pe_window(1), 0x1080_0000);
        assert_eq!(l.env_offset(1), 0x1090_0000);
        assert_eq!(l.core_to_dram(1, 0x1000_0000), Some(0x1080_0000));
        assert_eq!(l.core_to_dram(0, 0x0fff_ffff), None);
        assert_eq!(l.core_to_dram(0, 0x1080_0000), None);
    }

    #[test]
    fn free_memory_covers_the_rest_of_dram() {
        let l = Layout::default();
        let mem = l.free_memory(3);
        assert_eq!(mem.addr.get(), l.info_start(3) + l.kenv_size);
        assert_eq!(mem.addr.get() + mem.size.get(), l.dram_size);
    }

    #[test]
    fn kenv_address_points_at_table() {
        let l = Layout::default();
        let addr = l.kenv_address(4).unwrap();
        assert_eq!(addr.tile(), 8);
        assert_eq!(addr.offset(), l.info_start(4));
    }

    #[test]
    fn validate_rejects_broken_layouts() {
        let l = Layout { env_base: 0x100, ..Layout::default() };
        assert!(l.validate(1).is_err());
        let l = Layout { dram_size: 64 * 1024 * 1024, ..Layout::default() };
        assert!(l.validate(1).is_err());
        let l = Layout { mem_tile: 0x80, ..Layout::default() };
        assert_eq!(l.validate(1), Err(AbiError::TileOutOfRange(0x80)));
        let l = Layout { init_pmp_size: 4096 * 3 + 1, ..Layout::default() };
        assert!(l.validate(1).is_err());
    }

    proptest! {
        #[test]
        fn modules_are_page_aligned_and_ordered(
            pes in 1usize..16,
            sizes in proptest::collection::vec(0u64..100_000, 0..8),
        ) {
            let l = Layout::default();
            let mut addr = l.mods_base(pes);
            for size in sizes {
                let next = Layout::next_module(addr, size);
                prop_assert_eq!(next % PAGE_SIZE, 0);
                prop_assert!(next >= addr + size);
                prop_assert!(next < addr + size + PAGE_SIZE);
                addr = next;
            }
        }

        #[test]
        fn layout_is_deterministic(pes in 0usize..64) {
            let l = Layout::default();
            prop_assert_eq!(l.info_start(pes), l.info_start(pes));
            prop_assert_eq!(l.mods_base(pes), l.kenv_offset(pes) + MODS_GAP);
        }
    }
}
