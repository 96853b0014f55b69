// cli/src/deploy/monitor.rs - console forwarding and termination
//
// Streams the host-link console to the operator until the shutdown marker
// shows up, the tiles fall silent, or the operator interrupts.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Timing;
use crate::hw::{ConsoleLink, Received};

/// Why the monitor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MonitorOutcome {
    /// The shutdown marker was seen
    Shutdown,
    /// No output for `timeouts` consecutive receives
    Silent { timeouts: u32 },
    Interrupted,
    /// Writing to the operator console failed
    ConsoleFailed,
    /// The monitor never ran because staging failed
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

/// Silence counter and shutdown flag of a monitoring session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorState {
    pub timeouts: u32,
    pub shutdown: bool,
}

impl MonitorState {
    /// Any successful receive, decodable or not, ends a silent stretch.
    pub fn on_data(&mut self) {
        self.timeouts = 0;
    }

    pub fn on_timeout(&mut self, limit: u32, debug: bool) -> Step {
        self.timeouts = self.timeouts.saturating_add(1);
        if !debug && self.timeouts == limit {
            Step::Stop
        } else {
            Step::Continue
        }
    }
}

pub struct ConsoleMonitor<'a> {
    pub timing: &'a Timing,
    pub marker: &'a str,
    /// A tile is held back for a debugger; silence is expected then.
    pub debug: bool,
    pub interrupt: &'a AtomicBool,
}

impl ConsoleMonitor<'_> {
    pub fn run<L: ConsoleLink, W: Write>(&self, link: &mut L, out: &mut W) -> (MonitorOutcome, MonitorState) {
        let mut state = MonitorState::default();
        let wait = self.timing.receive_timeout();

        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                return (MonitorOutcome::Interrupted, state);
            }

            let received = link.receive(wait).unwrap_or_else(|err| {
                debug!(%err, "console receive failed");
                Received::Timeout
            });

            match received {
                Received::Data(bytes) => {
                    state.on_data();
                    let text = match std::str::from_utf8(&bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!(len = bytes.len(), "undecodable console data");
                            let reported = writeln!(out, "Unable to decode: {:?}", bytes)
                                .and_then(|_| write!(out, "\x1b[0m"))
                                .and_then(|_| out.flush());
                            if reported.is_err() {
                                return (MonitorOutcome::ConsoleFailed, state);
                            }
                            continue;
                        }
                    };
                    if write!(out, "{}\x1b[0m", text).and_then(|_| out.flush()).is_err() {
                        return (MonitorOutcome::ConsoleFailed, state);
                    }
                    if text.contains(self.marker) {
                        state.shutdown = true;
                        return (MonitorOutcome::Shutdown, state);
                    }
                }
                Received::Timeout => {
                    if state.on_timeout(self.timing.silence_limit, self.debug) == Step::Stop {
                        let secs = wait.as_secs_f64() * f64::from(state.timeouts);
                        // best effort, the run ends either way
                        let _ = writeln!(out, "Stopping execution after {} seconds without output", secs);
                        return (MonitorOutcome::Silent { timeouts: state.timeouts }, state);
                    }
                }
            }
        }
    }
}
