//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Rule-driven time-use classification.
///
/// Classifies an activity log with a rule file and reports where the time
/// went, category by category.
#[derive(Debug, Parser)]
#[command(name = "tally", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Activity logs and the date window to look at.
#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Activity log file; repeat to merge several logs.
    #[arg(long = "log", value_name = "PATH")]
    pub logs: Vec<PathBuf>,

    /// First day to include (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    pub from: Option<String>,

    /// Last day to include (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    pub to: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Classify the log and print time per category.
    Report {
        /// Rule file (defaults to the configured one).
        #[arg(long, value_name = "PATH")]
        rules: Option<PathBuf>,

        #[command(flatten)]
        logs: LogArgs,

        /// Deepest category level to print.
        #[arg(long, value_name = "N")]
        depth: Option<usize>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Compile a rule file and summarize it.
    Check {
        /// Rule file (defaults to the configured one).
        #[arg(long, value_name = "PATH")]
        rules: Option<PathBuf>,
    },

    /// Print sleep statistics.
    Sleep {
        #[command(flatten)]
        logs: LogArgs,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
