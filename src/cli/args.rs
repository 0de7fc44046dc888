//! Command line argument definitions for the obspace CLI.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::geometry::GridConfig;

/// Observation store tool: generate, inspect and perturb observation files.
#[derive(Parser, Debug, Clone)]
#[command(name = "obspace")]
#[command(about = "A distributed observation store")]
#[command(version)]
pub struct ObspaceArgs {
    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl ObspaceArgs {
    /// Get the effective verbosity level.
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else if self.verbose == 0 {
            1
        } else {
            self.verbose
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate random observations on a regular grid and persist them
    Generate(GenerateArgs),

    /// Load an observation file and report its contents
    Inspect(InspectArgs),

    /// Add a random perturbation group to an observation file
    Perturb(PerturbArgs),
}

/// Options shared by every command that runs a worker group.
#[derive(Args, Debug, Clone)]
pub struct WorkerArgs {
    /// Directory holding the observation files
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Number of worker threads (defaults to the number of CPUs)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Declared variables, comma separated
    #[arg(long, value_delimiter = ',', default_value = "temperature")]
    pub variables: Vec<String>,

    /// Grid columns along longitude
    #[arg(long, default_value = "36")]
    pub nx: usize,

    /// Grid rows along latitude
    #[arg(long, default_value = "18")]
    pub ny: usize,
}

impl WorkerArgs {
    /// The worker count, falling back to the CPU count.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }

    /// The grid described by `--nx`/`--ny` with default levels.
    pub fn grid_config(&self) -> GridConfig {
        GridConfig {
            nx: self.nx,
            ny: self.ny,
            ..GridConfig::default()
        }
    }
}

/// Arguments for observation generation.
#[derive(Parser, Debug, Clone)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub workers: WorkerArgs,

    /// Base name of the file to write
    #[arg(short, long, value_name = "BASE")]
    pub output: String,

    /// Number of observations to draw
    #[arg(long, default_value = "100")]
    pub density: usize,

    /// Variable whose levels bound the drawn heights (defaults to the first)
    #[arg(long)]
    pub variable: Option<String>,

    /// Constant error per variable, comma separated
    #[arg(long, value_delimiter = ',', default_value = "1.0")]
    pub error: Vec<f64>,

    /// Observation time (RFC 3339)
    #[arg(long, default_value = "2018-04-15T00:00:00Z")]
    pub time: DateTime<Utc>,
}

/// Arguments for inspecting a file.
#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    #[command(flatten)]
    pub workers: WorkerArgs,

    /// Base name of the file to read
    #[arg(value_name = "BASE")]
    pub input: String,

    #[command(flatten)]
    pub window: WindowArgs,

    /// Read the screened file instead
    #[arg(long)]
    pub screened: bool,
}

/// Arguments for perturbing a file.
#[derive(Parser, Debug, Clone)]
pub struct PerturbArgs {
    #[command(flatten)]
    pub workers: WorkerArgs,

    /// Base name of the file to read
    #[arg(value_name = "BASE")]
    pub input: String,

    /// Base name of the file to write
    #[arg(short, long, value_name = "BASE")]
    pub output: String,

    #[command(flatten)]
    pub window: WindowArgs,

    /// Name of the perturbation group
    #[arg(long, default_value = "ObsPerturbation")]
    pub group: String,

    /// Scale the perturbation by this group (e.g. ObsError)
    #[arg(long)]
    pub scale_by: Option<String>,
}

/// Assimilation window bounds.
#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    /// Window begin (RFC 3339, exclusive)
    #[arg(long, default_value = "2018-04-14T21:00:00Z")]
    pub begin: DateTime<Utc>,

    /// Window end (RFC 3339, inclusive)
    #[arg(long, default_value = "2018-04-15T03:00:00Z")]
    pub end: DateTime<Utc>,
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}
