//! tilebootctl: stages boot modules, programs and boot information onto the
//! tiles of a NoC platform, starts them and supervises their console.

pub mod config;
pub mod deploy;
pub mod error;
pub mod hw;
pub mod interrupt;
pub mod logging;
pub mod report;
pub mod sim;

pub use config::{PlatformConfig, Program, RunConfig};
pub use deploy::monitor::MonitorOutcome;
pub use error::{ConfigError, DeployError, HwError, Result};
pub use report::RunReport;
