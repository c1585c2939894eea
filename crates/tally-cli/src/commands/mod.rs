//! CLI subcommand implementations.

pub mod check;
pub mod report;
pub mod sleep;
pub mod util;
