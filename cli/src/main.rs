// cli/src/main.rs - tilebootctl entrypoint

use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use clap::{ArgAction, Parser};
use colored::Colorize;
use tracing::info;

use tilebootctl::sim::SimPlatform;
use tilebootctl::{deploy, interrupt, logging};
use tilebootctl::{ConfigError, DeployError, MonitorOutcome, PlatformConfig, Result, RunConfig, RunReport};

const EXIT_INTERRUPT: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "tilebootctl",
    version,
    about = "tilebootctl - loads and runs programs on the tiles of a NoC FPGA platform",
    long_about = "Stages boot modules, an optional filesystem image and one program per tile into the \
                  shared DRAM tile, starts the tiles and forwards their console until the workload \
                  shuts down or falls silent."
)]
struct Cli {
    /// FPGA board to use
    #[arg(long)]
    fpga: Option<u32>,

    /// Reset the whole platform before loading
    #[arg(long)]
    reset: bool,

    /// Leave this tile halted for an external debugger
    #[arg(long, value_name = "PE")]
    debug: Option<usize>,

    /// Program and arguments for the next tile, separated by spaces
    #[arg(long = "pe", value_name = "ARGS", allow_hyphen_values = true)]
    programs: Vec<String>,

    /// Boot module to hand to the kernel
    #[arg(long = "mod", value_name = "FILE")]
    modules: Vec<PathBuf>,

    /// Run the tiles with virtual memory
    #[arg(long)]
    vm: bool,

    /// Filesystem image placed at the start of DRAM
    #[arg(long, value_name = "FILE")]
    fs: Option<PathBuf>,

    /// TOML platform profile
    #[arg(long, value_name = "FILE", env = "TILEBOOT_PLATFORM")]
    platform: Option<PathBuf>,

    /// Deploy to the simulated platform
    #[arg(long)]
    sim: bool,

    /// Number of simulated tiles
    #[arg(long, requires = "sim")]
    cores: Option<usize>,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[arg(short, long, action = ArgAction::Count, conflicts_with = "verbose")]
    quiet: u8,
}

impl Cli {
    fn run_config(&self) -> std::result::Result<RunConfig, ConfigError> {
        let mut platform = match &self.platform {
            Some(path) => PlatformConfig::load(path)?,
            None => PlatformConfig::default(),
        };
        if let Some(cores) = self.cores {
            platform.sim.cores = cores;
        }

        let mut cfg = RunConfig::new(platform, &self.programs)?;
        cfg.fpga = self.fpga;
        cfg.reset = self.reset;
        cfg.debug = self.debug;
        cfg.modules = self.modules.clone();
        cfg.vm = self.vm;
        cfg.fs_image = self.fs.clone();
        Ok(cfg)
    }
}

fn execute(cli: &Cli, interrupt: &AtomicBool) -> Result<RunReport> {
    let cfg = cli.run_config()?;
    if !cli.sim {
        return Err(ConfigError::NoBackend.into());
    }

    let layout = cfg.layout();
    let mut platform = SimPlatform::new(cfg.platform.sim.cores, layout.mem_tile, layout.dram_size);
    info!(fpga = ?cfg.fpga, cores = cfg.platform.sim.cores, "deploying to simulated platform");

    let stdout = io::stdout();
    let mut console = stdout.lock();
    deploy::run(&cfg, &mut platform, &mut console, interrupt)
}

fn report_error(err: &DeployError) {
    eprintln!("{} {}", "error:".red().bold(), err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);
    let interrupt = interrupt::watch();

    match execute(&cli, &interrupt) {
        Ok(report) => match report.outcome {
            MonitorOutcome::Interrupted => {
                eprintln!("interrupt");
                ExitCode::from(EXIT_INTERRUPT)
            }
            MonitorOutcome::ConsoleFailed => {
                eprintln!("{} console output failed", "error:".red().bold());
                ExitCode::FAILURE
            }
            _ => ExitCode::SUCCESS,
        },
        Err(DeployError::Interrupted) => {
            eprintln!("interrupt");
            ExitCode::from(EXIT_INTERRUPT)
        }
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}
