//! Report command: time per category.
//!
//! Implements `tally report`, printing the classification tree with
//! durations, share of the parent and per-day averages, followed by tags,
//! excluded time and sleep statistics (human-readable or JSON).

use std::fmt::Write;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tally_core::group::GroupNode;
use tally_core::time::{render_duration, render_percent};
use tally_core::{
    ActivityList, Minute, Rules, SleepConfig, SleepStats, Timestamp, UncategorizedActivities,
    classify,
};

use crate::cli::LogArgs;
use crate::commands::{sleep, util};
use crate::config::Config;

/// Computed report data.
#[derive(Debug)]
pub struct ReportData {
    pub rules_name: String,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub days: i64,
    pub tree: GroupNode,
    pub excluded: Vec<GroupNode>,
    pub tags: Vec<TagTotal>,
    pub sleep: SleepStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagTotal {
    pub tag: String,
    pub total_minutes: Minute,
}

// ========== Report Generation ==========

/// Classifies the activities of `list` and gathers everything the report shows.
pub fn generate_report_data(
    rules: &Rules,
    list: &ActivityList,
    sleep: &SleepConfig,
) -> Result<ReportData, UncategorizedActivities> {
    let groups = classify(rules, list.iter(), |percent| {
        tracing::trace!(percent, "classifying");
    })?;

    Ok(ReportData {
        rules_name: rules.name.clone(),
        start: list.start_date(),
        end: list.end_date(),
        days: util::day_count(list),
        tree: groups.tree(&rules.colors),
        excluded: groups.excluded(&rules.colors),
        tags: groups
            .tags()
            .into_iter()
            .map(|t| TagTotal {
                tag: t.name.clone(),
                total_minutes: t.total_minutes,
            })
            .collect(),
        sleep: list.sleep_stats(sleep),
    })
}

/// Drops every node deeper than `depth` below `node`.
pub fn truncate_depth(node: &mut GroupNode, depth: usize) {
    if depth == 0 {
        node.children.clear();
        return;
    }
    for child in &mut node.children {
        truncate_depth(child, depth - 1);
    }
}

// ========== Text Output ==========

#[allow(clippy::cast_precision_loss)]
fn write_node(output: &mut String, node: &GroupNode, parent_total: Minute, level: usize, days: i64) {
    let label = format!("{}{}", "  ".repeat(level), node.name);
    let share = if parent_total > 0 {
        node.total_minutes as f64 * node.weight / parent_total as f64 * 100.0
    } else {
        100.0
    };
    let weight = if node.weight < 1.0 {
        format!("  ({:.0}% share)", node.weight * 100.0)
    } else {
        String::new()
    };
    writeln!(
        output,
        "{label:<24}{:>7}{:>8}{:>7}/day{weight}",
        render_duration(node.total_minutes),
        render_percent(share),
        render_duration(node.total_minutes / days.max(1)),
    )
    .unwrap();
    for child in &node.children {
        write_node(output, child, node.total_minutes, level + 1, days);
    }
}

/// Formats the human-readable report.
pub fn format_report(data: &ReportData) -> String {
    let mut output = String::new();

    writeln!(output, "TIME REPORT: {}", data.rules_name).unwrap();
    match (data.start, data.end) {
        (Some(start), Some(end)) => {
            let unit = if data.days == 1 { "day" } else { "days" };
            writeln!(output, "{start} → {end} ({} {unit})", data.days).unwrap();
        }
        _ => writeln!(output, "No activities recorded.").unwrap(),
    }

    writeln!(output).unwrap();
    writeln!(output, "BY CATEGORY").unwrap();
    writeln!(output, "───────────").unwrap();
    write_node(&mut output, &data.tree, data.tree.total_minutes, 0, data.days);

    writeln!(output).unwrap();
    writeln!(output, "BY TAG").unwrap();
    writeln!(output, "──────").unwrap();
    if data.tags.is_empty() {
        writeln!(output, "(no tagged activities)").unwrap();
    }
    for tag in &data.tags {
        writeln!(
            output,
            "{:<24}{:>7}{:>7}/day",
            tag.tag,
            render_duration(tag.total_minutes),
            render_duration(tag.total_minutes / data.days.max(1)),
        )
        .unwrap();
    }

    if !data.excluded.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "EXCLUDED").unwrap();
        writeln!(output, "────────").unwrap();
        for root in &data.excluded {
            write_node(&mut output, root, root.total_minutes, 0, data.days);
        }
    }

    writeln!(output).unwrap();
    output.push_str(&sleep::format_sleep(&data.sleep));

    output
}

// ========== JSON Output ==========

/// JSON report structure.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub rules: &'a str,
    pub start: Option<String>,
    pub end: Option<String>,
    pub days: i64,
    pub tree: &'a GroupNode,
    pub excluded: &'a [GroupNode],
    pub tags: &'a [TagTotal],
    pub sleep: SleepStats,
}

/// Formats report data as JSON.
pub fn format_report_json(data: &ReportData) -> Result<String> {
    let report = JsonReport {
        rules: &data.rules_name,
        start: data.start.map(|t| t.to_readable_string()),
        end: data.end.map(|t| t.to_readable_string()),
        days: data.days,
        tree: &data.tree,
        excluded: &data.excluded,
        tags: &data.tags,
        sleep: data.sleep,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Prints paste-ready rules for unmatched activities, then every occurrence.
fn print_uncategorized(uncategorized: &UncategorizedActivities) {
    eprintln!("Some activities match no rule. Suggested rules:");
    for suggestion in &uncategorized.suggestions {
        eprintln!("{suggestion}");
    }
    eprintln!();
    for message in uncategorized.messages() {
        eprintln!("{message}");
    }
}

// ========== Public Interface ==========

/// Runs the report command.
pub fn run(
    config: &Config,
    rules_path: Option<&Path>,
    logs: &LogArgs,
    depth: Option<usize>,
    json: bool,
) -> Result<()> {
    let rules = util::read_rules(rules_path.unwrap_or(&config.rules_path))?;
    let list = util::read_activities(util::log_paths(logs, config), &config.sleep)?;
    let list = util::apply_window(&list, logs.from.as_deref(), logs.to.as_deref())?;

    let mut data = match generate_report_data(&rules, &list, &config.sleep) {
        Ok(data) => data,
        Err(uncategorized) => {
            print_uncategorized(&uncategorized);
            return Err(uncategorized.into());
        }
    };
    if let Some(depth) = depth {
        truncate_depth(&mut data.tree, depth);
        for root in &mut data.excluded {
            truncate_depth(root, depth);
        }
    }

    if json {
        println!("{}", format_report_json(&data)?);
    } else {
        print!("{}", format_report(&data));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use tally_core::{compile_rules, load_log};

    const RULES: &str = "\
[general]
name = Test

[colors]
Job = #336699

[rules]
Work = 75% Job 25% Fun
Gym = Sport #health
Zzz = Sleep

[exclude]
Commute = Transit
";

    const LOG: &str = "\
2024-03-15:0830:2024-03-15:0900 Commute
2024-03-15:0900:2024-03-15:1100 Work
2024-03-15:1800:2024-03-15:1900 Gym
2024-03-15:2300:2024-03-16:0700 Zzz
";

    fn report_data() -> ReportData {
        let rules = compile_rules(RULES).unwrap();
        let sleep = SleepConfig::default();
        let list = load_log(LOG, &sleep).unwrap();
        generate_report_data(&rules, &list, &sleep).unwrap()
    }

    // ========== Generation ==========

    #[test]
    fn test_generate_report_data() {
        let data = report_data();
        assert_eq!(data.rules_name, "Test");
        assert_eq!(data.days, 1);
        assert_eq!(data.tree.total_minutes, 660);
        assert_eq!(data.excluded.len(), 1);
        assert_eq!(
            data.tags,
            vec![TagTotal {
                tag: "#health".to_string(),
                total_minutes: 60
            }]
        );
        assert_eq!(data.sleep.nights, 1);
    }

    #[test]
    fn test_uncategorized_activities_fail_generation() {
        let rules = compile_rules("[general]\nname = T\n[rules]\nWork = Job\n").unwrap();
        let sleep = SleepConfig::default();
        let list = load_log(LOG, &sleep).unwrap();
        let err = generate_report_data(&rules, &list, &sleep).unwrap_err();
        assert_eq!(
            err.suggestions,
            vec![
                "Commute = Uncategorized",
                "Gym = Uncategorized",
                "Zzz = Uncategorized"
            ]
        );
    }

    #[test]
    fn test_truncate_depth() {
        let mut data = report_data();
        truncate_depth(&mut data.tree, 1);
        assert_eq!(data.tree.children.len(), 4);
        assert!(data.tree.children.iter().all(|c| c.children.is_empty()));
    }

    // ========== Formatting ==========

    #[test]
    fn test_report_text() {
        let output = format_report(&report_data());
        assert_snapshot!(output.trim_end(), @r"
        TIME REPORT: Test
        2024-03-15 08:30 → 2024-03-16 07:00 (1 day)

        BY CATEGORY
        ───────────
        Everything                11:00  100.0%  11:00/day
          Sleep                   08:00   72.7%  08:00/day
            Zzz                   08:00  100.0%  08:00/day
          Job                     01:30   13.6%  01:30/day
            Work                  02:00  100.0%  02:00/day  (75% share)
          Sport                   01:00    9.0%  01:00/day
            Gym                   01:00  100.0%  01:00/day
          Fun                     00:30    4.5%  00:30/day
            Work                  02:00  100.0%  02:00/day  (25% share)

        BY TAG
        ──────
        #health                   01:00  01:00/day

        EXCLUDED
        ────────
        Transit                   00:30  100.0%  00:30/day
          Commute                 00:30  100.0%  00:30/day

        SLEEP
        ─────
        Nights:    1
        Duration:  08:00 ± 00:00
        Bedtime:   23:00 ± 00:00
        ");
    }

    #[test]
    fn test_report_without_activities() {
        let rules = compile_rules(RULES).unwrap();
        let sleep = SleepConfig::default();
        let data = generate_report_data(&rules, &ActivityList::new(Vec::new()), &sleep).unwrap();
        let output = format_report(&data);
        assert!(output.contains("No activities recorded."));
        assert!(output.contains("(no tagged activities)"));
        assert!(output.contains("No main sleep recorded."));
        assert!(!output.contains("EXCLUDED"));
    }

    #[test]
    fn test_report_json() {
        let output = format_report_json(&report_data()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["rules"], "Test");
        assert_eq!(json["start"], "2024-03-15 08:30");
        assert_eq!(json["tree"]["total_minutes"], 660);
        assert_eq!(json["tree"]["children"][1]["name"], "Job");
        assert_eq!(json["tree"]["children"][1]["color"], "#336699");
        assert_eq!(json["excluded"][0]["name"], "Transit");
        assert_eq!(json["tags"][0]["tag"], "#health");
        assert_eq!(json["sleep"]["duration"]["average"], 480);
    }
}
