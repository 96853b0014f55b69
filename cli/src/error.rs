// cli/src/error.rs - failure taxonomy of a deployment

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tileboot_abi::AbiError;

/// Failures reported by the hardware-access layer.
#[derive(Debug, Error)]
pub enum HwError {
    #[error("link timed out")]
    Timeout,

    #[error("link error: {0}")]
    Link(String),

    #[error("read-back mismatch at {offset:#x} ({len} bytes)")]
    WriteMismatch { offset: u64, len: usize },

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

pub type HwResult<T> = std::result::Result<T, HwError>;

/// Problems with the run configuration or platform profile.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read platform profile {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid platform profile {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("debug tile {debug} does not exist (platform has {cores})")]
    DebugTile { debug: usize, cores: usize },

    #[error("no program given for any tile (use --pe)")]
    NoPrograms,

    #[error("no hardware backend is built in, run with --sim")]
    NoBackend,

    #[error("empty --pe argument for tile {0}")]
    EmptyProgram(usize),

    #[error("boot modules exceed the reserved area by {needed} bytes at {path}")]
    ModuleSpace { path: PathBuf, needed: u64 },

    #[error("boot-info table of {size} bytes overlaps the first module")]
    BootInfoTooLarge { size: u64 },

    #[error("filesystem image {path} has {size} bytes, at most {max} fit")]
    FsTooLarge { path: PathBuf, size: u64, max: u64 },

    #[error(transparent)]
    Abi(#[from] AbiError),
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("PE{pe}: not enough space for arguments ({needed} bytes needed, {capacity} available)")]
    ArgumentOverflow { pe: usize, needed: u64, capacity: u64 },

    #[error("cannot read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("{path}: verified upload failed: {source}")]
    Upload { path: PathBuf, source: HwError },

    #[error("{path}: bad image: {reason}")]
    Image { path: PathBuf, reason: String },

    #[error("hardware access failed: {0}")]
    Hardware(#[from] HwError),

    #[error("interrupted during upload")]
    Interrupted,
}

impl DeployError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn image(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Image { path: path.into(), reason: reason.into() }
    }

    /// Maps a failed write of `path` to shared memory.
    pub fn upload(path: impl Into<PathBuf>, source: HwError) -> Self {
        Self::Upload { path: path.into(), source }
    }

    /// True for errors caused by the configuration rather than by I/O or
    /// hardware. These are never worth retrying.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ArgumentOverflow { .. })
    }
}

impl From<AbiError> for DeployError {
    fn from(err: AbiError) -> Self {
        Self::Config(ConfigError::Abi(err))
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_errors_are_configuration_errors() {
        let overflow = DeployError::ArgumentOverflow { pe: 1, needed: 0x408, capacity: 0x400 };
        assert!(overflow.is_config());
        assert!(DeployError::from(AbiError::Layout("x")).is_config());

        let io = DeployError::io("boot.img", io::Error::from(io::ErrorKind::NotFound));
        assert!(!io.is_config());
        let upload = DeployError::upload("boot.img", HwError::WriteMismatch { offset: 0, len: 4 });
        assert!(!upload.is_config());
    }

    #[test]
    fn messages_name_the_tile() {
        let err = DeployError::ArgumentOverflow { pe: 2, needed: 0x408, capacity: 0x400 };
        assert_eq!(
            err.to_string(),
            "PE2: not enough space for arguments (1032 bytes needed, 1024 available)"
        );
    }
}
