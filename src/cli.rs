use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "leaselock", version, about, long_about = None)]
pub struct Cli {
    /// TOML file with lock options; `LEASELOCK_*` variables override it
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose mode (-v, -vv, -vvv)
    #[arg(short, action = ArgAction::Count)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Workers increment a shared counter file under the lock, then the
    /// counter is checked against the number of successful increments
    Stress {
        /// Resource name all workers contend on
        #[arg(short, long, default_value = "counter")]
        resource: String,
        #[arg(short, long, default_value_t = 5)]
        workers: usize,
        /// Lock/increment/release cycles per worker
        #[arg(short, long, default_value_t = 100)]
        iterations: usize,
        /// Counter file, created or truncated at start
        #[arg(long)]
        counter: Option<PathBuf>,
        /// Simulated store round-trip in milliseconds
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Acquire, probe and release a lock once
    Probe {
        #[arg(short, long, default_value = "probe")]
        resource: String,
        /// Retry until the acquire timeout instead of failing fast
        #[arg(short, long)]
        blocking: bool,
    },
}

/// Maps `-v` count to a tracing filter directive
pub fn verbosity_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}
