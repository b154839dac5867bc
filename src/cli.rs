//! CLI argument parsing for perfcache

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table (default)
    Text,
    /// JSON for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "perfcache")]
#[command(version)]
#[command(about = "Function-level profiler with a fingerprinted metrics cache", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output on stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// TOML configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Profile a target program and merge its metrics into the cache
    Profile(ProfileArgs),
    /// List cached metrics entries
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Target program to profile
    pub target: PathBuf,

    /// Cache file (overrides config)
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Instrumentation runner command, one argument per flag (overrides config)
    #[arg(long, value_name = "ARG")]
    pub runner: Vec<String>,

    /// Match functions from every source unit, not only the target's
    #[arg(long)]
    pub all_units: bool,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Arguments passed to the target (everything after --)
    #[arg(last = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Cache file (overrides config)
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Only list entries for this function name
    #[arg(long, value_name = "NAME")]
    pub function: Option<String>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}
