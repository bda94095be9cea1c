//! perfmon - hardware performance counter reader
//!
//! Reads named counters from the device and prints `name = value` lines.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sonic_perfmon::{
    CounterIndex, PerfMonConfig, PerfMonitor, RequestProxy, SimulatedDevice, DEFAULT_CONFIG_PATH,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Hardware performance counter reader
#[derive(Parser, Debug)]
#[command(name = "perfmon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Response timeout in milliseconds (0 waits forever)
    #[arg(short = 't', long)]
    timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Log every counter read
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every counter named in a counter list file
    Print {
        /// File with one `index,name` record per line
        file: PathBuf,

        /// Enable counting before reading
        #[arg(long)]
        enable: bool,
    },
    /// Read a single counter (decimal or 0x-prefixed hex index)
    Read { index: CounterIndex },
    /// Enable counting
    Enable,
    /// Disable counting
    Disable,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args.log_level, args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("perfmon: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str, verbose: bool) {
    let default_level = if verbose { "debug" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries counter output, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let mut config = PerfMonConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(timeout_ms) = args.timeout_ms {
        config.monitor.response_timeout_ms = timeout_ms;
    }
    if args.verbose {
        config.monitor.verbose = true;
    }
    config.validate()?;

    let model = config.simulator.model()?;
    let channels = config.channels();
    let monitor = PerfMonitor::connect(config.settings(), |indication| {
        SimulatedDevice::spawn(channels, model, indication)
    })?;

    let cancel = monitor.cancel_handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT, cancelling reads");
            cancel.cancel();
        }
    });

    let command = args.command;
    tokio::task::spawn_blocking(move || execute(&monitor, command))
        .await
        .context("command task failed")?
}

fn execute<P: RequestProxy>(monitor: &PerfMonitor<P>, command: Command) -> Result<()> {
    match command {
        Command::Print { file, enable } => {
            if enable {
                monitor.set_enabled(true)?;
            }
            let count = monitor
                .print_all(&file)
                .with_context(|| format!("printing counters from {}", file.display()))?;
            info!("Printed {} counters", count);
        }
        Command::Read { index } => {
            let value = monitor.read_counter(index)?;
            println!("{}", value);
        }
        Command::Enable => monitor.set_enabled(true)?,
        Command::Disable => monitor.set_enabled(false)?,
    }
    Ok(())
}
