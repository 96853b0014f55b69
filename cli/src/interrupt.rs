// cli/src/interrupt.rs - operator interrupt
//
// The deployment itself is synchronous. A watcher thread runs a small tokio
// runtime that waits for Ctrl-C and raises a flag the deployment polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

/// Starts the watcher and returns the flag it raises. If no watcher can be
/// started the flag simply never rises.
pub fn watch() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let raised = Arc::clone(&flag);

    let spawned = thread::Builder::new().name("interrupt".into()).spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(err) => {
                warn!(%err, "cannot start interrupt watcher");
                return;
            }
        };
        runtime.block_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    debug!("interrupt received");
                    raised.store(true, Ordering::SeqCst);
                }
                Err(err) => warn!(%err, "cannot listen for interrupts"),
            }
        });
    });
    if let Err(err) = spawned {
        warn!(%err, "cannot spawn interrupt watcher");
    }
    flag
}
