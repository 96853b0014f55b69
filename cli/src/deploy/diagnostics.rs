// cli/src/deploy/diagnostics.rs - post-run counters, logs and halt
//
// Runs after every deployment, whatever happened before. Each tile is handled
// in isolation: nothing that fails here stops the other tiles from being
// examined and halted.

use std::fs;
use std::io::Write;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PlatformConfig;
use crate::hw::{CoreTile, FlitCounters, LogKind, PacketCounters, Platform};

/// Result of pulling one log from one tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum LogExtraction {
    Skipped,
    /// The incremental read succeeded
    Primary { lines: usize },
    /// The incremental read failed; the control unit was reset and the log
    /// read exhaustively
    Retried { lines: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoreReport {
    pub pe: usize,
    pub packets: Option<PacketCounters>,
    pub flits: Option<FlitCounters>,
    pub tcu_log: LogExtraction,
    pub trace: LogExtraction,
    pub halted: bool,
}

/// Which logs a run that ended after `timeouts` silent receives warrants.
fn wanted(cfg: &PlatformConfig, timeouts: u32, kind: LogKind) -> bool {
    timeouts > 0 || (kind == LogKind::Instructions && cfg.always_trace)
}

/// Reads `kind` from `core`, falling back to reset plus exhaustive read.
pub fn extract_log<C: CoreTile>(core: &mut C, kind: LogKind) -> (LogExtraction, Vec<String>) {
    match core.read_log(kind, false) {
        Ok(lines) => return (LogExtraction::Primary { lines: lines.len() }, lines),
        Err(err) => warn!(?kind, %err, "log read failed, resetting control unit"),
    }
    if let Err(err) = core.reset() {
        warn!(?kind, %err, "control unit reset failed");
    }
    match core.read_log(kind, true) {
        Ok(lines) => (LogExtraction::Retried { lines: lines.len() }, lines),
        Err(err) => (LogExtraction::Failed { error: err.to_string() }, Vec::new()),
    }
}

fn save_log(dir: &Path, name: &str, lines: &[String]) {
    let path = dir.join(name);
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    match fs::write(&path, text) {
        Ok(()) => info!(file = %path.display(), lines = lines.len(), "log saved"),
        Err(err) => warn!(file = %path.display(), %err, "cannot save log"),
    }
}

fn print_counters<W: Write>(out: &mut W, pe: usize, packets: Option<PacketCounters>, flits: Option<FlitCounters>) {
    let line = match packets {
        Some(PacketCounters { dropped, total }) if total > 0 => {
            let pct = dropped as f64 / total as f64 * 100.0;
            format!("PE{}: {} of {} packets dropped ({:.2}%)", pe, dropped, total, pct)
        }
        Some(PacketCounters { dropped, total }) => format!("PE{}: {} of {} packets dropped", pe, dropped, total),
        None => format!("PE{}: {}", pe, "packet counters unavailable".red()),
    };
    let _ = writeln!(out, "{}", line);

    let line = match flits {
        Some(FlitCounters { dropped, errors }) if dropped > 0 || errors > 0 => {
            format!("PE{}: {}", pe, format!("{} flits dropped, {} with errors", dropped, errors).yellow())
        }
        Some(FlitCounters { dropped, errors }) => format!("PE{}: {} flits dropped, {} with errors", pe, dropped, errors),
        None => format!("PE{}: {}", pe, "flit counters unavailable".red()),
    };
    let _ = writeln!(out, "{}", line);
}

/// Stops the fabric, then examines and halts every tile. Logs are only pulled
/// if the console had gone silent (`timeouts > 0`).
pub fn collect<P: Platform, W: Write>(
    platform: &mut P,
    cfg: &PlatformConfig,
    timeouts: u32,
    out: &mut W,
) -> Vec<CoreReport> {
    let _ = writeln!(out, "{}", "Stopping all PEs...".bold());
    if let Err(err) = platform.set_fabric_transport(false) {
        warn!(%err, "cannot disable fabric transport");
    }

    let wants_logs = LogKind::ALL.iter().any(|&kind| wanted(cfg, timeouts, kind));
    if wants_logs {
        if let Err(err) = fs::create_dir_all(&cfg.log_dir) {
            warn!(dir = %cfg.log_dir.display(), %err, "cannot create log directory");
        }
    }

    let mut reports = Vec::new();
    for (pe, core) in platform.cores().iter_mut().enumerate() {
        if let Err(err) = core.set_transport_enabled(false) {
            warn!(pe, %err, "cannot disable transport");
        }

        let packets = core.packet_counters().map_err(|err| warn!(pe, %err, "packet counters")).ok();
        let flits = core.flit_counters().map_err(|err| warn!(pe, %err, "flit counters")).ok();
        print_counters(out, pe, packets, flits);

        let mut extract = |kind: LogKind| {
            if !wanted(cfg, timeouts, kind) {
                return LogExtraction::Skipped;
            }
            let (result, lines) = extract_log(core, kind);
            match &result {
                LogExtraction::Failed { error } => {
                    let _ = writeln!(out, "PE{}: {}", pe, format!("cannot read {:?} log: {}", kind, error).red());
                }
                _ => save_log(&cfg.log_dir, &kind.file_name(pe), &lines),
            }
            result
        };
        let tcu_log = extract(LogKind::TcuCommands);
        let trace = extract(LogKind::Instructions);

        let halted = match core.halt() {
            Ok(()) => true,
            Err(err) => {
                warn!(pe, %err, "cannot halt");
                false
            }
        };
        reports.push(CoreReport { pe, packets, flits, tcu_log, trace, halted });
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{CoreOp, Event, SimPlatform};
    use pretty_assertions::assert_eq;

    fn config(dir: &Path) -> PlatformConfig {
        PlatformConfig { log_dir: dir.join("log"), ..PlatformConfig::default() }
    }

    fn sim_with_logs(cores: usize) -> SimPlatform {
        let mut sim = SimPlatform::new(cores, 8, 4096);
        for pe in 0..cores {
            let core = sim.core_mut(pe);
            core.set_log(LogKind::TcuCommands, vec![format!("pe{} cmd", pe)]);
            core.set_log(LogKind::Instructions, vec!["0x10000000: nop".into(), "0x10000004: nop".into()]);
        }
        sim
    }

    #[test]
    fn core_two_retries_after_failed_read() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        let mut sim = sim_with_logs(4);
        sim.core_mut(2).faults.primary_log = true;
        let mut out = Vec::new();

        let reports = collect(&mut sim, &cfg, 10, &mut out);

        assert_eq!(reports.len(), 4);
        assert_eq!(reports[1].tcu_log, LogExtraction::Primary { lines: 1 });
        // the reset on retry wipes the command log
        assert_eq!(reports[2].tcu_log, LogExtraction::Retried { lines: 0 });
        assert_eq!(reports[2].trace, LogExtraction::Retried { lines: 2 });
        assert!(reports.iter().all(|r| r.halted));

        let ops: Vec<CoreOp> = sim
            .journal()
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Core { pe: 2, op } => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                CoreOp::Transport(false),
                CoreOp::ReadLog { kind: LogKind::TcuCommands, exhaustive: false },
                CoreOp::Reset,
                CoreOp::ReadLog { kind: LogKind::TcuCommands, exhaustive: true },
                CoreOp::ReadLog { kind: LogKind::Instructions, exhaustive: false },
                CoreOp::Reset,
                CoreOp::ReadLog { kind: LogKind::Instructions, exhaustive: true },
                CoreOp::Halt,
            ]
        );

        let trace = fs::read_to_string(cfg.log_dir.join("pm2-instrs.log")).unwrap();
        assert_eq!(trace, "0x10000000: nop\n0x10000004: nop\n");
        assert!(cfg.log_dir.join("pm3-tcu-cmds.log").exists());
    }

    #[test]
    fn double_failure_is_isolated() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        let mut sim = sim_with_logs(3);
        sim.core_mut(1).faults.primary_log = true;
        sim.core_mut(1).faults.exhaustive_log = true;
        sim.core_mut(1).faults.packet_counters = true;
        let mut out = Vec::new();

        let reports = collect(&mut sim, &cfg, 3, &mut out);

        assert!(matches!(reports[1].tcu_log, LogExtraction::Failed { .. }));
        assert!(matches!(reports[1].trace, LogExtraction::Failed { .. }));
        assert_eq!(reports[1].packets, None);
        assert!(reports[1].flits.is_some());
        assert!(reports[1].halted);
        assert_eq!(reports[2].trace, LogExtraction::Primary { lines: 2 });
        assert!(!cfg.log_dir.join("pm1-instrs.log").exists());
        assert!(!sim.core(2).is_running());
    }

    #[test]
    fn no_silence_skips_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path());
        let mut sim = sim_with_logs(2);

        let reports = collect(&mut sim, &cfg, 0, &mut Vec::new());

        assert!(reports.iter().all(|r| r.tcu_log == LogExtraction::Skipped));
        assert!(reports.iter().all(|r| r.trace == LogExtraction::Skipped));
        assert!(!cfg.log_dir.exists());
        assert!(!sim.fabric_transport());
        assert!(!sim.core(0).transport_enabled());
    }

    #[test]
    fn always_trace_pulls_trace_after_clean_shutdown() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = PlatformConfig { always_trace: true, ..config(tmp.path()) };
        let mut sim = sim_with_logs(1);

        let reports = collect(&mut sim, &cfg, 0, &mut Vec::new());

        assert_eq!(reports[0].tcu_log, LogExtraction::Skipped);
        assert_eq!(reports[0].trace, LogExtraction::Primary { lines: 2 });
        assert!(cfg.log_dir.join("pm0-instrs.log").exists());
    }

    #[test]
    fn counters_print_percentage() {
        let mut sim = SimPlatform::new(1, 8, 4096);
        sim.core_mut(0).set_counters(
            PacketCounters { dropped: 1, total: 8 },
            FlitCounters { dropped: 0, errors: 0 },
        );
        let tmp = tempfile::tempdir().unwrap();
        let mut out = Vec::new();
        collect(&mut sim, &config(tmp.path()), 0, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("PE0: 1 of 8 packets dropped (12.50%)"));
        assert!(text.contains("PE0: 0 flits dropped, 0 with errors"));
    }
}
