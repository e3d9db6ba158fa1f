use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use strata_observe::LogFormat;

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RunArgs {
    #[arg(
        long,
        conflicts_with = "payload_file",
        help = "Job payload as a JSON object, overlaid on the workspace config"
    )]
    pub payload: Option<String>,

    #[arg(long, help = "Read the job payload from a JSON file")]
    pub payload_file: Option<PathBuf>,

    #[arg(
        long,
        help = "Repeat the run every N seconds instead of exiting after one pass"
    )]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct MetricsArgs {
    #[arg(long, help = "Graph version whose drift metrics to list")]
    pub graph_version: String,

    #[arg(long, help = "Only show the newest row per metric")]
    pub latest: bool,

    #[arg(long, default_value_t = 20, help = "Row limit (clamped to 1..500)")]
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct RollbacksArgs {
    #[arg(long, help = "Graph version the rollback would move away from")]
    pub graph_version: String,

    #[arg(long, default_value_t = 20, help = "Row limit (clamped to 1..500)")]
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Create .strata/config.toml and the SQLite schema
    Init,
    /// Run the structural drift monitor
    Run(RunArgs),
    /// List persisted drift metric rows
    Metrics(MetricsArgs),
    /// List recorded rollback events
    Rollbacks(RollbacksArgs),
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "STRATA structural drift monitor")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Workspace root holding .strata/"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log output format: human or json"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}
