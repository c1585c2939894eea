//! Sleep command: per-night sleep statistics.

use std::fmt::Write;

use anyhow::Result;
use tally_core::SleepStats;
use tally_core::time::render_duration;

use crate::cli::LogArgs;
use crate::commands::util;
use crate::config::Config;

/// Formats the sleep section shared with `tally report`.
pub fn format_sleep(stats: &SleepStats) -> String {
    let mut output = String::new();
    writeln!(output, "SLEEP").unwrap();
    writeln!(output, "─────").unwrap();
    if stats.nights == 0 {
        writeln!(output, "No main sleep recorded.").unwrap();
        return output;
    }
    writeln!(output, "Nights:    {}", stats.nights).unwrap();
    writeln!(
        output,
        "Duration:  {} ± {}",
        render_duration(stats.duration.average),
        render_duration(stats.duration.deviation)
    )
    .unwrap();
    writeln!(
        output,
        "Bedtime:   {} ± {}",
        render_duration(stats.bedtime.average),
        render_duration(stats.bedtime.deviation)
    )
    .unwrap();
    output
}

/// Runs the sleep command.
pub fn run(config: &Config, logs: &LogArgs, json: bool) -> Result<()> {
    let list = util::read_activities(util::log_paths(logs, config), &config.sleep)?;
    let list = util::apply_window(&list, logs.from.as_deref(), logs.to.as_deref())?;
    let stats = list.sleep_stats(&config.sleep);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", format_sleep(&stats));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use tally_core::{Distribution, SleepStats};

    #[test]
    fn test_format_sleep() {
        let stats = SleepStats {
            nights: 7,
            duration: Distribution {
                average: 450,
                deviation: 35,
            },
            bedtime: Distribution {
                average: 1410,
                deviation: 50,
            },
        };
        assert_snapshot!(format_sleep(&stats).trim_end(), @r"
        SLEEP
        ─────
        Nights:    7
        Duration:  07:30 ± 00:35
        Bedtime:   23:30 ± 00:50
        ");
    }

    #[test]
    fn test_format_sleep_without_nights() {
        let output = format_sleep(&SleepStats::default());
        assert!(output.ends_with("No main sleep recorded.\n"));
    }
}
