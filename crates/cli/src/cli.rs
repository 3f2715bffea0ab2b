//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Flushline - concurrent write-buffering engine
#[derive(Parser, Debug)]
#[command(
    name = "flushline",
    author,
    version,
    about = "Batch and flush records into a sink",
    long_about = "Accepts newline-delimited records, spreads them over a pool of batch \n\
                  workers and delivers them to the configured sink, flushing on size, \n\
                  on time and on shutdown."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "FLUSHLINE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "FLUSHLINE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream records through the engine
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "flushline.toml", env = "FLUSHLINE_CONFIG")]
    pub config: PathBuf,

    /// Newline-delimited input file ("-" or absent = stdin)
    #[arg(short, long, env = "FLUSHLINE_INPUT")]
    pub input: Option<PathBuf>,

    /// Override the worker count from configuration
    #[arg(long, env = "FLUSHLINE_WORKERS")]
    pub workers: Option<i32>,

    /// Override the max batch delay (ms) from configuration
    #[arg(long, env = "FLUSHLINE_MAX_BATCH_DELAY_MS")]
    pub max_batch_delay_ms: Option<u64>,

    /// Stop after this many records (0 = unlimited)
    #[arg(long, default_value = "0", env = "FLUSHLINE_MAX_RECORDS")]
    pub max_records: u64,

    /// Validate configuration and exit without streaming
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "FLUSHLINE_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "flushline.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "flushline.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show sink parameters
    #[arg(long)]
    pub params: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
