// cli/src/logging.rs - diagnostic output setup
//
// Diagnostics go to stderr; stdout carries the tile console and the status
// lines the operator reads.

use tracing_subscriber::EnvFilter;

/// Filter directive for the given `-v`/`-q` counts.
pub fn level(verbose: u8, quiet: u8) -> &'static str {
    match i16::from(verbose) - i16::from(quiet) {
        i16::MIN..=-2 => "off",
        -1 => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// command-line verbosity.
pub fn init(verbose: u8, quiet: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level(verbose, quiet)));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if let Err(err) = installed {
        eprintln!("logging disabled: {}", err);
    }
}
