// cli/src/deploy.rs - staging, supervision and cleanup of one run
//
// Staging writes everything the tiles need while they are halted and the NoC
// runs without retransmission. Only once every upload went through is
// reliable delivery restored and the tiles released.

pub mod bootinfo;
pub mod diagnostics;
pub mod modules;
pub mod monitor;
pub mod program;

use std::fs;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::error::{ConfigError, DeployError, Result};
use crate::hw::{CoreTile, Platform};
use crate::report::RunReport;
use monitor::{ConsoleMonitor, MonitorOutcome, MonitorState};
use modules::PlacedModule;

/// What staging left behind.
#[derive(Debug, Default)]
pub struct Staged {
    pub modules: Vec<PlacedModule>,
    pub loaded: Vec<usize>,
    pub started: Vec<usize>,
}

fn check_interrupt(interrupt: &AtomicBool) -> Result<()> {
    if interrupt.load(Ordering::SeqCst) {
        return Err(DeployError::Interrupted);
    }
    Ok(())
}

/// Uploads everything and starts the tiles.
pub fn stage<P: Platform>(cfg: &RunConfig, platform: &mut P, interrupt: &AtomicBool) -> Result<Staged> {
    let cores = platform.core_count();
    cfg.validate(cores)?;
    if cfg.programs.len() > cores {
        warn!(given = cfg.programs.len(), cores, "more programs than tiles, ignoring the rest");
    }

    if cfg.reset {
        info!("resetting platform");
        platform.system_reset()?;
    }
    for core in platform.cores() {
        core.halt()?;
    }
    for core in platform.cores() {
        core.set_transport_enabled(false)?;
    }
    platform.set_fabric_transport(false)?;

    let mut staged = Staged::default();
    {
        let (tiles, mem) = platform.parts();
        staged.modules = bootinfo::write_boot_info(mem, cfg, cores)?;

        if let Some(path) = &cfg.fs_image {
            check_interrupt(interrupt)?;
            let size = fs::metadata(path).map_err(|e| DeployError::io(path, e))?.len();
            let max = cfg.layout().max_fs_size;
            if size > max {
                return Err(ConfigError::FsTooLarge { path: path.clone(), size, max }.into());
            }
            modules::load(mem, path, 0)?;
        }

        for (pe, (tile, prog)) in tiles.iter_mut().zip(&cfg.programs).enumerate() {
            check_interrupt(interrupt)?;
            program::load_program(tile, mem, cfg, pe, cores, prog)?;
            staged.loaded.push(pe);
        }
    }
    check_interrupt(interrupt)?;

    platform.set_fabric_transport(true)?;
    let arq = cfg.platform.timing.arq_timeout;
    for core in platform.cores() {
        core.set_transport_enabled(true)?;
        core.set_transport_timeout(arq)?;
    }

    let tiles = platform.cores();
    for &pe in &staged.loaded {
        if cfg.debug == Some(pe) {
            info!(pe, "holding tile back for the debugger");
            continue;
        }
        tiles[pe].start()?;
        staged.started.push(pe);
    }
    info!(started = ?staged.started, "tiles running");

    if cfg.debug.is_some() {
        let path = &cfg.platform.ready_file;
        fs::write(path, "1").map_err(|e| DeployError::io(path, e))?;
    }
    Ok(staged)
}

/// Runs one deployment: staging, console supervision and cleanup. Cleanup
/// runs whatever staging or the monitor did; a staging error is returned
/// once the tiles are halted.
pub fn run<P: Platform, W: Write>(
    cfg: &RunConfig,
    platform: &mut P,
    console: &mut W,
    interrupt: &AtomicBool,
) -> Result<RunReport> {
    let started_at = Utc::now();
    let staged = stage(cfg, platform, interrupt);

    let (outcome, state) = match &staged {
        Ok(_) => {
            let monitor = ConsoleMonitor {
                timing: &cfg.platform.timing,
                marker: &cfg.platform.shutdown_marker,
                debug: cfg.debug.is_some(),
                interrupt,
            };
            monitor.run(platform, console)
        }
        Err(DeployError::Interrupted) => (MonitorOutcome::Interrupted, MonitorState::default()),
        Err(err) => {
            error!(%err, "staging failed");
            (MonitorOutcome::Aborted, MonitorState::default())
        }
    };

    let diagnostics = diagnostics::collect(platform, &cfg.platform, state.timeouts, console);

    let (staged, result) = match staged {
        Ok(staged) => (staged, Ok(())),
        Err(err) => (Staged::default(), Err(err)),
    };
    let report = RunReport {
        started_at,
        finished_at: Utc::now(),
        fpga: cfg.fpga,
        cores: diagnostics.len(),
        vm: cfg.vm,
        debug: cfg.debug,
        modules: staged.modules,
        loaded: staged.loaded,
        started: staged.started,
        outcome,
        timeouts: state.timeouts,
        error: result.as_ref().err().map(ToString::to_string),
        diagnostics,
    };
    if let Err(err) = report.save(&cfg.platform.log_dir) {
        warn!(%err, "cannot write run report");
    }

    result.map(|()| report)
}
