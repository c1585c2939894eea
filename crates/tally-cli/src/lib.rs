//! tally CLI library.
//!
//! Argument parsing, configuration and the subcommands of the `tally` binary.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, LogArgs};
pub use config::Config;
