// cli/src/deploy/bootinfo.rs - boot-info table construction

use tileboot_abi::{BootInfoHeader, Layout, MemDesc, ModDesc, PeDesc};
use tileboot_abi::layout::MODS_GAP;
use tracing::info;
use zerocopy::AsBytes;

use super::modules::{self, PlacedModule};
use crate::config::RunConfig;
use crate::error::{ConfigError, Result};
use crate::hw::SharedMemory;

/// Bytes the table occupies for the given module and tile counts.
pub fn table_size(mods: usize, cores: usize) -> u64 {
    BootInfoHeader::SIZE + mods as u64 * ModDesc::SIZE + (cores as u64 + 1) * 8 + MemDesc::SIZE
}

/// Writes the boot-info table for `cores` compute tiles plus the DRAM tile,
/// uploading every boot module on the way.
pub fn write_boot_info<M: SharedMemory>(
    mem: &mut M,
    cfg: &RunConfig,
    cores: usize,
) -> Result<Vec<PlacedModule>> {
    let layout = cfg.layout();
    let size = table_size(cfg.modules.len(), cores);
    if size > MODS_GAP {
        return Err(ConfigError::BootInfoTooLarge { size }.into());
    }

    let mut off = layout.kenv_offset(cores);
    info!(offset = format_args!("{:#x}", off), modules = cfg.modules.len(), cores, "writing boot info");

    let header = BootInfoHeader::new(cfg.modules.len() as u64, cores as u64 + 1, 1);
    mem.write(off, header.as_bytes())?;
    off += BootInfoHeader::SIZE;

    let mut addr = layout.mods_base(cores);
    let limit = layout.mods_limit(cores);
    let mut placed = Vec::with_capacity(cfg.modules.len());
    for path in &cfg.modules {
        let module = modules::add_module(mem, layout, path, addr, off, limit)?;
        addr = Layout::next_module(addr, module.size);
        off += ModDesc::SIZE;
        placed.push(module);
    }

    let pe_desc = PeDesc::compute(cfg.vm, layout.pe_mem_size)?;
    for _ in 0..cores {
        mem.write_u64(off, pe_desc.pack())?;
        off += 8;
    }
    mem.write_u64(off, PeDesc::memory(layout.dram_size)?.pack())?;
    off += 8;

    mem.write(off, layout.free_memory(cores).as_bytes())?;
    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;
    use crate::hw::Platform;
    use crate::sim::SimPlatform;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn module(size: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0x5A; size]).unwrap();
        file
    }

    #[test]
    fn two_modules_three_cores() {
        let (a, b) = (module(100), module(5000));
        let mut cfg = RunConfig::new(PlatformConfig::default(), &["root".into()]).unwrap();
        cfg.modules = vec![a.path().into(), b.path().into()];
        let layout = *cfg.layout();
        let mut sim = SimPlatform::new(3, 8, layout.dram_size);

        let placed = write_boot_info(sim.memory(), &cfg, 3).unwrap();

        let base = layout.info_start(3);
        let dram = sim.dram();
        let header = BootInfoHeader::parse(&dram.peek(base, 32)).unwrap();
        assert_eq!(header.mod_count.get(), 2);
        assert_eq!(header.pe_count.get(), 4);
        assert_eq!(header.mem_count.get(), 1);
        assert_eq!(header.serv_count.get(), 0);

        let first = ModDesc::parse(&dram.peek(base + 32, 80)).unwrap();
        let second = ModDesc::parse(&dram.peek(base + 112, 80)).unwrap();
        let first_off = base + 0x1000;
        assert_eq!(first.addr.get() & ((1 << 56) - 1), first_off);
        assert_eq!(second.addr.get() & ((1 << 56) - 1), Layout::next_module(first_off, 100));
        assert_eq!(second.size.get(), 5000);
        assert_eq!(placed.len(), 2);
        assert_eq!(dram.peek(first_off + 0x1000, 4), vec![0x5A; 4]);

        let pes = base + 192;
        for i in 0..3 {
            assert_eq!(dram.peek_u64(pes + i * 8), (2 << 20) | (3 << 3));
        }
        assert_eq!(dram.peek_u64(pes + 24), layout.dram_size | 2);

        let mem = MemDesc::parse(&dram.peek(pes + 32, 16)).unwrap();
        assert_eq!(mem.addr.get(), base + layout.kenv_size);
        assert_eq!(mem.size.get(), layout.dram_size - base - layout.kenv_size);
    }

    #[test]
    fn vm_mode_descriptors() {
        let mut cfg = RunConfig::new(PlatformConfig::default(), &["root".into()]).unwrap();
        cfg.vm = true;
        let mut sim = SimPlatform::new(2, 8, cfg.layout().dram_size);
        write_boot_info(sim.memory(), &cfg, 2).unwrap();
        let pes = cfg.layout().info_start(2) + 32;
        assert_eq!(sim.dram().peek_u64(pes), (3 << 3) | 1);
        assert_eq!(sim.dram().peek_u64(pes + 8), (3 << 3) | 1);
    }

    #[test]
    fn oversized_table_is_rejected() {
        let mut cfg = RunConfig::new(PlatformConfig::default(), &["root".into()]).unwrap();
        cfg.modules = vec!["m".into(); 60];
        let mut sim = SimPlatform::new(2, 8, cfg.layout().dram_size);
        let err = write_boot_info(sim.memory(), &cfg, 2).unwrap_err();
        assert!(err.is_config());
        assert_eq!(sim.dram().touched_pages(), 0);
    }
}
