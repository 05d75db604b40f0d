//! Binary entry point for the page access contention harness.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use pagesync::{
    config::SyncOptions,
    logging::init_logging,
    stress::{self, StressConfig, StressReport},
};

#[derive(Parser, Debug)]
#[command(
    name = "pagesync-stress",
    version,
    about = "Hammer the page access synchronizer and check mutual exclusion"
)]
struct Cli {
    #[arg(long, default_value_t = 20, help = "Number of distinct pages")]
    keys: usize,

    #[arg(long, default_value_t = 10, help = "Number of worker threads")]
    workers: usize,

    #[arg(long, default_value_t = 10, help = "Run duration in seconds")]
    duration_secs: u64,

    #[arg(
        long,
        default_value_t = 2,
        help = "Upper bound on how long a worker holds its pages (ms)"
    )]
    hold_ms: u64,

    #[arg(
        long,
        help = "Wait ceiling per lock_page call (ms); overrides the config file"
    )]
    max_wait_ms: Option<u64>,

    #[arg(
        long,
        help = "Registry shard count (power of two); overrides the config file"
    )]
    shards: Option<usize>,

    #[arg(long, value_name = "FILE", help = "TOML file with synchronizer options")]
    config: Option<PathBuf>,

    #[arg(
        long,
        env = "PAGESYNC_LOG",
        default_value = "warn",
        help = "Log filter directive"
    )]
    log_level: String,

    #[arg(
        long,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for the report"
    )]
    format: OutputFormat,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<bool, Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    let opts = match cli.config.as_ref() {
        Some(path) => SyncOptions::load(path)?,
        None => SyncOptions::new(Duration::from_secs(1)),
    };
    let max_wait = cli
        .max_wait_ms
        .map(Duration::from_millis)
        .unwrap_or(opts.max_wait);
    let config = StressConfig {
        keys: cli.keys,
        workers: cli.workers,
        duration: Duration::from_secs(cli.duration_secs),
        hold: Duration::from_millis(cli.hold_ms),
        max_wait,
        shards: cli.shards.unwrap_or(opts.shards),
    };
    let report = stress::run(&config)?;
    emit(cli.format, &report)?;
    Ok(report.is_clean())
}

fn emit(format: OutputFormat, report: &StressReport) -> Result<(), Box<dyn Error>> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report)?;
            println!("{json}");
        }
        OutputFormat::Text => println!("{report}"),
    }
    Ok(())
}
