// cli/src/deploy/program.rs - per-tile program loading
//
// Brings one tile from an unknown state to "ready to start": control unit
// reset, endpoints cleared, its DRAM window installed, image, environment and
// arguments in place. The steps run in a fixed order; a tile must never see a
// window before its stale endpoints are gone.

use std::fs;
use std::path::Path;

use tileboot_abi::env::{ARGS_END, ARGV_OFFSET};
use tileboot_abi::{AbiError, ArgRegion, EnvBlock, Layout, PeDesc};
use tracing::{debug, info};
use xmas_elf::header::Class;
use xmas_elf::program::Type;
use xmas_elf::ElfFile;
use zerocopy::AsBytes;

use crate::config::{Program, RunConfig};
use crate::error::{DeployError, Result};
use crate::hw::{CoreTile, Endpoint, Features, MemWindow, Perm, SharedMemory, CTX_PRIV};

const ZERO_CHUNK: usize = 64 * 1024;

/// Loads `prog` onto tile `pe` of a platform with `cores` tiles.
pub fn load_program<C: CoreTile, M: SharedMemory>(
    core: &mut C,
    mem: &mut M,
    cfg: &RunConfig,
    pe: usize,
    cores: usize,
    prog: &Program,
) -> Result<()> {
    let layout = cfg.layout();
    info!(pe, image = %prog.image().display(), "loading program");

    core.halt()?;
    core.reset()?;
    core.enable_trace()?;
    core.set_features(Features::for_deployment(cfg.vm))?;

    for slot in 0..cfg.platform.endpoint_slots {
        core.set_endpoint(slot, Endpoint::Invalid)?;
    }
    core.set_endpoint(0, Endpoint::Memory(window(layout, pe)))?;

    let entry = load_image(mem, layout, pe, prog.image())?;
    debug!(pe, entry = format_args!("{:#x}", entry), "image loaded");

    let argv = layout.env_base + ARGV_OFFSET;
    let args = ArgRegion::pack(argv, layout.env_base + ARGS_END, &prog.argv).map_err(|e| match e {
        AbiError::ArgumentOverflow { needed, capacity } => {
            DeployError::ArgumentOverflow { pe, needed, capacity }
        }
        other => other.into(),
    })?;

    let pe_desc = PeDesc::compute(cfg.vm, layout.pe_mem_size)?;
    let heap_size = if cfg.vm { cfg.platform.vm_heap_size } else { 0 };
    let kenv = if pe == 0 { Some(layout.kenv_address(cores)?) } else { None };
    let env = EnvBlock::hardware(pe as u64, pe_desc, prog.argv.len() as u64, argv, heap_size, kenv);
    mem.write(layout.env_offset(pe), env.as_bytes())?;

    let args_off = layout.env_offset(pe) + ARGV_OFFSET;
    mem.write(args_off, args.as_bytes())?;
    Ok(())
}

/// The initial memory endpoint of tile `pe`: its private DRAM window.
pub fn window(layout: &Layout, pe: usize) -> MemWindow {
    MemWindow {
        tile: layout.mem_tile,
        ctx: CTX_PRIV,
        perm: Perm::READ | Perm::WRITE,
        base: layout.pe_window(pe),
        size: layout.init_pmp_size,
    }
}

/// Copies the loadable segments of the ELF file at `path` into tile `pe`'s
/// window and returns the entry point.
pub fn load_image<M: SharedMemory>(mem: &mut M, layout: &Layout, pe: usize, path: &Path) -> Result<u64> {
    let raw = fs::read(path).map_err(|e| DeployError::io(path, e))?;
    // the parser reads headers in place and needs them 8-byte aligned
    let mut words = vec![0u64; (raw.len() + 7) / 8];
    words.as_bytes_mut()[..raw.len()].copy_from_slice(&raw);
    let data = &words.as_bytes()[..raw.len()];

    let elf = ElfFile::new(data).map_err(|e| DeployError::image(path, e))?;
    check_program_headers(&elf, data.len()).map_err(|reason| DeployError::image(path, reason))?;

    let mut loaded = 0;
    for ph in elf.program_iter() {
        if !matches!(ph.get_type(), Ok(Type::Load)) || ph.mem_size() == 0 {
            continue;
        }
        let (paddr, file_size, mem_size) = (ph.physical_addr(), ph.file_size(), ph.mem_size());
        if file_size > mem_size {
            return Err(DeployError::image(path, "segment file size exceeds memory size"));
        }

        let start = layout.core_to_dram(pe, paddr);
        let last = paddr.checked_add(mem_size - 1).and_then(|end| layout.core_to_dram(pe, end));
        let Some(dest) = start.filter(|_| last.is_some()) else {
            return Err(DeployError::image(
                path,
                format!("segment {:#x}+{:#x} outside the tile window", paddr, mem_size),
            ));
        };

        let bytes = usize::try_from(ph.offset())
            .ok()
            .zip(usize::try_from(file_size).ok())
            .and_then(|(off, len)| data.get(off..off.checked_add(len)?))
            .ok_or_else(|| DeployError::image(path, "segment data beyond end of file"))?;

        debug!(pe, paddr = format_args!("{:#x}", paddr), file_size, mem_size, "loading segment");
        mem.write_checked(dest, bytes).map_err(|e| DeployError::upload(path, e))?;
        zero_fill(mem, dest + file_size, mem_size - file_size)?;
        loaded += 1;
    }

    if loaded == 0 {
        return Err(DeployError::image(path, "no loadable segments"));
    }
    Ok(elf.header.pt2.entry_point())
}

/// The program header table must lie inside the file with every entry
/// aligned for its class. The parser slices entries without checking.
fn check_program_headers(elf: &ElfFile, len: usize) -> std::result::Result<(), &'static str> {
    let (entry_min, align) = match elf.header.pt1.class() {
        Class::SixtyFour => (56u64, 8u64),
        Class::ThirtyTwo => (32, 4),
        _ => return Err("unknown ELF class"),
    };
    let pt2 = &elf.header.pt2;
    let (offset, entry, count) = (pt2.ph_offset(), u64::from(pt2.ph_entry_size()), u64::from(pt2.ph_count()));
    if count == 0 {
        return Ok(());
    }
    if entry < entry_min || entry % align != 0 || offset % align != 0 {
        return Err("misaligned program header table");
    }
    match entry.checked_mul(count).and_then(|size| size.checked_add(offset)) {
        Some(end) if end <= len as u64 => Ok(()),
        _ => Err("program header table beyond end of file"),
    }
}

fn zero_fill<M: SharedMemory>(mem: &mut M, mut offset: u64, mut len: u64) -> Result<()> {
    let zeros = [0u8; ZERO_CHUNK];
    while len > 0 {
        let n = len.min(ZERO_CHUNK as u64);
        mem.write(offset, &zeros[..n as usize])?;
        offset += n;
        len -= n;
    }
    Ok(())
}
