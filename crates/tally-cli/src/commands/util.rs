//! Shared utilities for CLI commands.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tally_core::time::MINUTES_PER_DAY;
use tally_core::{ActivityList, Rules, SleepConfig, Timestamp, compile_rules, expand_includes};

use crate::cli::LogArgs;
use crate::config::Config;

/// The logs named on the command line, or the configured ones.
pub fn log_paths<'a>(logs: &'a LogArgs, config: &'a Config) -> &'a [PathBuf] {
    if logs.logs.is_empty() {
        &config.log_paths
    } else {
        &logs.logs
    }
}

/// Reads, expands and compiles a rule file.
///
/// Includes are resolved relative to the directory of the rule file.
pub fn read_rules(path: &Path) -> Result<Rules> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read rule file {}", path.display()))?;
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let expanded = expand_includes(&text, |include| fs::read_to_string(base.join(include)))
        .with_context(|| format!("failed to expand includes of {}", path.display()))?;
    let rules = compile_rules(&expanded)
        .with_context(|| format!("failed to compile rule file {}", path.display()))?;
    tracing::debug!(path = ?path, name = rules.name, "loaded rules");
    Ok(rules)
}

/// Reads and merges activity logs.
pub fn read_activities(paths: &[PathBuf], sleep: &SleepConfig) -> Result<ActivityList> {
    if paths.is_empty() {
        bail!("no activity log given, pass --log or set log_paths in the config");
    }
    let mut activities = Vec::new();
    for path in paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read activity log {}", path.display()))?;
        let parsed = tally_core::parse_log(&text)
            .with_context(|| format!("failed to parse activity log {}", path.display()))?;
        tracing::debug!(path = ?path, activities = parsed.len(), "parsed activity log");
        activities.extend(parsed);
    }
    Ok(tally_core::assemble(activities, sleep))
}

/// Restricts a list to the days between `from` and `to`, both included.
///
/// A missing bound falls back to the start or end of the log.
pub fn apply_window(list: &ActivityList, from: Option<&str>, to: Option<&str>) -> Result<ActivityList> {
    if from.is_none() && to.is_none() {
        return Ok(list.clone());
    }
    let start = match from {
        Some(date) => Timestamp::parse_date(date).context("invalid --from date")?,
        None => list.start_date().unwrap_or_else(|| Timestamp::from_minutes(0)),
    };
    let end = match to {
        Some(date) => Timestamp::parse_date(date).context("invalid --to date")? + MINUTES_PER_DAY,
        None => list.end_date().unwrap_or(start),
    };
    if end <= start {
        bail!("empty date window: {start} to {end}");
    }
    Ok(list.view(start, end))
}

/// Number of days covered by a list, at least one.
pub fn day_count(list: &ActivityList) -> i64 {
    match (list.start_date(), list.end_date()) {
        (Some(start), Some(end)) if end > start => (end - start + MINUTES_PER_DAY - 1) / MINUTES_PER_DAY,
        _ => 1,
    }
}
