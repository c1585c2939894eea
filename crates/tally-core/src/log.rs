//! Loading the canonical activity log.

use rayon::prelude::*;
use thiserror::Error;

use crate::activity::{Activity, ParseError};
use crate::activity_list::ActivityList;
use crate::sleep::{SleepConfig, tack_nights};
use crate::time::Timestamp;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: ParseError,
    },

    #[error("line {line}: activity starts at {start}, before the previous one at {previous}")]
    OutOfOrder {
        line: usize,
        start: Timestamp,
        previous: Timestamp,
    },
}

/// Parses every line of a log, skipping blank lines and in-progress entries.
///
/// Lines are parsed in parallel; the first error in file order is returned.
pub fn parse_log(text: &str) -> Result<Vec<Activity>, LogError> {
    let lines: Vec<&str> = text.lines().collect();
    let parsed: Vec<Result<Option<Activity>, LogError>> = lines
        .par_iter()
        .enumerate()
        .map(|(index, line)| {
            if line.trim().is_empty() {
                return Ok(None);
            }
            match Activity::parse(line) {
                Ok(activity) => Ok(Some(activity)),
                Err(ParseError::Pending { .. }) => {
                    tracing::debug!(line = index + 1, "skipping activity in progress");
                    Ok(None)
                }
                Err(source) => Err(LogError::Parse {
                    line: index + 1,
                    source,
                }),
            }
        })
        .collect();

    let mut activities = Vec::with_capacity(parsed.len());
    let mut previous: Option<Timestamp> = None;
    for (index, result) in parsed.into_iter().enumerate() {
        let Some(activity) = result? else {
            continue;
        };
        if let Some(previous_start) = previous {
            if activity.start < previous_start {
                return Err(LogError::OutOfOrder {
                    line: index + 1,
                    start: activity.start,
                    previous: previous_start,
                });
            }
        }
        previous = Some(activity.start);
        activities.push(activity);
    }
    Ok(activities)
}

/// Parses a log, attributes after-midnight sleep to the previous night, and
/// wraps the result.
pub fn load_log(text: &str, config: &SleepConfig) -> Result<ActivityList, LogError> {
    Ok(assemble(parse_log(text)?, config))
}

/// Sorts activities gathered from one or more logs, tacks nights and wraps
/// them.
pub fn assemble(mut activities: Vec<Activity>, config: &SleepConfig) -> ActivityList {
    activities.sort_by_key(|a| a.start);
    tack_nights(&mut activities, config);
    tracing::info!(activities = activities.len(), "loaded activity log");
    ActivityList::new(activities)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "\
2024-03-15:2300:2024-03-16:0100 Reading
2024-03-16:0100:2024-03-16:0800 Zzz

2024-03-16:0800:2024-03-16:0830 Breakfast
2024-03-16:0830:2024-03-16:0900
";

    #[test]
    fn test_load_log_skips_blank_and_pending() {
        let list = load_log(LOG, &SleepConfig::default()).unwrap();
        let names: Vec<String> = list.iter().map(|a| a.name.clone()).collect();
        assert_eq!(names, vec!["Reading", "Zzz", "Breakfast"]);
    }

    #[test]
    fn test_load_log_tacks_nights() {
        let list = load_log(LOG, &SleepConfig::default()).unwrap();
        let night = Timestamp::new(2024, 3, 15, 0, 0).unwrap();
        assert_eq!(list.raw()[1].day_start, night);
        assert_eq!(list.raw()[2].day_start, night + 1440);

        let stats = list.sleep_stats(&SleepConfig::default());
        assert_eq!(stats.nights, 1);
        assert_eq!(stats.duration.average, 420);
    }

    #[test]
    fn test_parse_error_reports_line_number() {
        let err = parse_log("2024-03-15:0900:2024-03-15:1000 Work\nnonsense\n").unwrap_err();
        assert!(matches!(err, LogError::Parse { line: 2, source: ParseError::MalformedLine { .. } }));
        assert_eq!(err.to_string(), "line 2: malformed line: \"nonsense\"");
    }

    #[test]
    fn test_first_error_wins() {
        let err = parse_log("bad one\n2024-03-15:0900:2024-03-15:1000 Work\nbad two\n").unwrap_err();
        assert!(matches!(err, LogError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_assemble_merges_logs() {
        let evening = parse_log("2024-03-15:2200:2024-03-15:2330 Reading\n").unwrap();
        let night = parse_log("2024-03-16:0030:2024-03-16:0700 Zzz\n").unwrap();
        let list = assemble([night, evening].concat(), &SleepConfig::default());
        let names: Vec<String> = list.iter().map(|a| a.name.clone()).collect();
        assert_eq!(names, vec!["Reading", "Zzz"]);
        assert_eq!(list.raw()[1].day_start, Timestamp::new(2024, 3, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_out_of_order_lines() {
        let err = parse_log(
            "2024-03-15:0900:2024-03-15:1000 Work\n2024-03-15:0800:2024-03-15:0900 Commute\n",
        )
        .unwrap_err();
        assert!(matches!(err, LogError::OutOfOrder { line: 2, .. }));
    }
}
