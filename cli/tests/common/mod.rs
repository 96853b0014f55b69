#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tilebootctl::config::{PlatformConfig, RunConfig};
use tilebootctl::sim::SimPlatform;

/// Writes a RISC-V ELF64 executable with a single loadable segment of `code`
/// at physical address `paddr`.
pub fn write_elf(dir: &Path, name: &str, paddr: u64, code: &[u8]) -> PathBuf {
    let mut out = Vec::new();
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&0xF3u16.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&paddr.to_le_bytes());
    out.extend_from_slice(&64u64.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    for half in [64u16, 56, 1, 64, 0, 0] {
        out.extend_from_slice(&half.to_le_bytes());
    }

    let size = code.len() as u64;
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&5u32.to_le_bytes());
    for word in [120, paddr, paddr, size, size, 0x1000] {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out.extend_from_slice(code);

    let path = dir.join(name);
    fs::write(&path, out).unwrap();
    path
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

/// A run configuration whose outputs all land in `dir`.
pub fn run_config(dir: &Path, programs: &[String]) -> RunConfig {
    let platform = PlatformConfig {
        log_dir: dir.join("log"),
        ready_file: dir.join(".ready"),
        ..PlatformConfig::default()
    };
    RunConfig::new(platform, programs).unwrap()
}

pub fn sim(cfg: &RunConfig, cores: usize) -> SimPlatform {
    SimPlatform::new(cores, cfg.layout().mem_tile, cfg.layout().dram_size)
}
