// cli/src/config.rs - run configuration
//
// Built once at start-up from the command line and an optional TOML platform
// profile, then handed to every stage by reference.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tileboot_abi::Layout;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timing {
    /// Upper bound of a single console receive
    pub receive_ms: u64,
    /// Consecutive silent receives after which the run is stopped
    pub silence_limit: u32,
    /// Retransmit timeout programmed once the tiles run
    pub arq_timeout: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self { receive_ms: 1000, silence_limit: 10, arq_timeout: 200 }
    }
}

impl Timing {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    pub cores: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self { cores: 8 }
    }
}

/// Static description of the target platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformConfig {
    pub layout: Layout,
    pub timing: Timing,
    /// Endpoint slots invalidated before a tile is configured. The deployment
    /// path has always cleared 63; the control unit may have more.
    pub endpoint_slots: usize,
    /// Heap handed to tiles running with virtual memory
    pub vm_heap_size: u64,
    pub shutdown_marker: String,
    pub log_dir: PathBuf,
    pub ready_file: PathBuf,
    /// Also pull the instruction trace when the console never went silent
    pub always_trace: bool,
    pub sim: SimConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            timing: Timing::default(),
            endpoint_slots: 63,
            vm_heap_size: 0x10000,
            shutdown_marker: "Shutting down".into(),
            log_dir: PathBuf::from("log"),
            ready_file: PathBuf::from(".ready"),
            always_trace: false,
            sim: SimConfig::default(),
        }
    }
}

impl PlatformConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.into(), source })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse { path: origin.into(), source })
    }
}

/// Program and arguments for one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub argv: Vec<String>,
}

impl Program {
    /// Splits a `--pe` value at spaces; the first word is the image path.
    pub fn parse(pe: usize, spec: &str) -> Result<Self, ConfigError> {
        let argv: Vec<String> = spec.split(' ').filter(|a| !a.is_empty()).map(String::from).collect();
        if argv.is_empty() {
            return Err(ConfigError::EmptyProgram(pe));
        }
        Ok(Self { argv })
    }

    pub fn image(&self) -> &Path {
        Path::new(&self.argv[0])
    }
}

/// Everything a deployment needs to know.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub fpga: Option<u32>,
    pub reset: bool,
    /// Tile left halted for an external debugger
    pub debug: Option<usize>,
    pub programs: Vec<Program>,
    pub modules: Vec<PathBuf>,
    pub vm: bool,
    pub fs_image: Option<PathBuf>,
    pub platform: PlatformConfig,
}

impl RunConfig {
    pub fn new(platform: PlatformConfig, pe_specs: &[String]) -> Result<Self, ConfigError> {
        let programs = pe_specs
            .iter()
            .enumerate()
            .map(|(pe, spec)| Program::parse(pe, spec))
            .collect::<Result<Vec<_>, _>>()?;
        if programs.is_empty() {
            return Err(ConfigError::NoPrograms);
        }
        Ok(Self {
            fpga: None,
            reset: false,
            debug: None,
            programs,
            modules: Vec::new(),
            vm: false,
            fs_image: None,
            platform,
        })
    }

    /// Checks the configuration against a platform with `cores` tiles.
    pub fn validate(&self, cores: usize) -> Result<(), ConfigError> {
        if let Some(debug) = self.debug {
            if debug >= cores {
                return Err(ConfigError::DebugTile { debug, cores });
            }
        }
        self.platform.layout.validate(cores)?;
        Ok(())
    }

    pub fn layout(&self) -> &Layout {
        &self.platform.layout
    }
}
