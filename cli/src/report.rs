// cli/src/report.rs - machine-readable summary of a run

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::deploy::diagnostics::CoreReport;
use crate::deploy::modules::PlacedModule;
use crate::deploy::monitor::MonitorOutcome;

pub const REPORT_FILE: &str = "run.json";

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fpga: Option<u32>,
    pub cores: usize,
    pub vm: bool,
    pub debug: Option<usize>,
    pub modules: Vec<PlacedModule>,
    /// Tiles that received a program
    pub loaded: Vec<usize>,
    pub started: Vec<usize>,
    pub outcome: MonitorOutcome,
    /// Silent receives at the end of the run
    pub timeouts: u32,
    pub error: Option<String>,
    pub diagnostics: Vec<CoreReport>,
}

impl RunReport {
    /// Writes the report as pretty JSON into `dir`.
    pub fn save(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE);
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(&path, json)?;
        Ok(path)
    }
}
