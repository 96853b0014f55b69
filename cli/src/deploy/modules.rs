// cli/src/deploy/modules.rs - boot modules and filesystem image upload

use std::fs;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tileboot_abi::{GlobAddr, Layout, ModDesc};
use tracing::{debug, info};
use zerocopy::AsBytes;

use crate::error::{ConfigError, DeployError, Result};
use crate::hw::SharedMemory;

/// A module as the boot-info table describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedModule {
    pub name: String,
    /// Global address of the module data
    pub addr: u64,
    pub size: u64,
    pub sha256: String,
}

fn read_host(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| DeployError::io(path, e))
}

fn upload<M: SharedMemory>(mem: &mut M, path: &Path, offset: u64, data: &[u8]) -> Result<()> {
    info!(file = %path.display(), bytes = data.len(), offset = format_args!("{:#x}", offset), "uploading");
    mem.write_checked(offset, data).map_err(|e| DeployError::upload(path, e))
}

/// Copies the host file `path` verbatim to `offset` and returns its size.
pub fn load<M: SharedMemory>(mem: &mut M, path: &Path, offset: u64) -> Result<u64> {
    let data = read_host(path)?;
    upload(mem, path, offset, &data)?;
    Ok(data.len() as u64)
}

/// Writes the descriptor for `path` at `table_offset`, then the module data
/// at `data_addr`. The data must end before `limit`.
pub fn add_module<M: SharedMemory>(
    mem: &mut M,
    layout: &Layout,
    path: &Path,
    data_addr: u64,
    table_offset: u64,
    limit: u64,
) -> Result<PlacedModule> {
    let data = read_host(path)?;
    let size = data.len() as u64;
    if data_addr + size > limit {
        return Err(ConfigError::ModuleSpace { path: path.into(), needed: data_addr + size - limit }.into());
    }

    let name = path.display().to_string();
    let addr = GlobAddr::new(layout.mem_tile, data_addr)?;
    let desc = ModDesc::new(addr, size, &name)?;
    mem.write(table_offset, desc.as_bytes())?;
    debug!(module = %name, %addr, size, "module descriptor written");

    upload(mem, path, data_addr, &data)?;

    Ok(PlacedModule {
        name,
        addr: addr.raw(),
        size,
        sha256: format!("{:x}", Sha256::digest(&data)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimPlatform;
    use crate::hw::Platform;
    use std::io::Write;

    fn host_file(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn load_copies_file_verbatim() {
        let file = host_file(b"filesystem image");
        let mut sim = SimPlatform::new(1, 8, 1 << 30);
        let size = load(sim.memory(), file.path(), 0).unwrap();
        assert_eq!(size, 16);
        assert_eq!(sim.dram().peek(0, 16), b"filesystem image");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let mut sim = SimPlatform::new(1, 8, 1 << 30);
        let err = load(sim.memory(), Path::new("/nonexistent/fs.img"), 0).unwrap_err();
        assert!(matches!(err, DeployError::Io { .. }));
        assert!(!err.is_config());
    }

    #[test]
    fn mismatching_read_back_aborts() {
        let file = host_file(b"abc");
        let mut sim = SimPlatform::new(1, 8, 1 << 30);
        sim.dram_mut().corrupt_writes = true;
        let err = load(sim.memory(), file.path(), 0x1000).unwrap_err();
        assert!(matches!(err, DeployError::Upload { .. }));
    }

    #[test]
    fn descriptor_precedes_data() {
        let file = host_file(&[0xAA; 100]);
        let layout = Layout::default();
        let mut sim = SimPlatform::new(1, 8, 1 << 31);
        let placed =
            add_module(sim.memory(), &layout, file.path(), 0x1500_1000, 0x1500_0020, 0x1600_0000)
                .unwrap();

        assert_eq!(placed.size, 100);
        assert_eq!(placed.addr, GlobAddr::new(8, 0x1500_1000).unwrap().raw());
        assert_eq!(placed.sha256.len(), 64);

        let desc = ModDesc::parse(&sim.dram().peek(0x1500_0020, 80)).unwrap();
        assert_eq!(desc.addr.get(), placed.addr);
        assert_eq!(desc.size.get(), 100);
        assert_eq!(desc.name(), Some(placed.name.as_str()));
        assert_eq!(sim.dram().peek(0x1500_1000, 100), vec![0xAA; 100]);
    }

    #[test]
    fn module_beyond_reserved_area_is_rejected() {
        let file = host_file(&[0; 64]);
        let mut sim = SimPlatform::new(1, 8, 1 << 31);
        let err = add_module(sim.memory(), &Layout::default(), file.path(), 0x1000, 0x0, 0x1020)
            .unwrap_err();
        assert!(err.is_config());
    }
}
