//! A single named time interval from the activity log.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::time::{InvalidDateError, MINUTES_PER_DAY, Minute, Timestamp};

/// Longest span a single log line may cover before it is considered a typo.
pub const MAX_ACTIVITY_MINUTES: Minute = 2 * MINUTES_PER_DAY;

/// `YYYY-MM-DD:HHMM:YYYY-MM-DD:HHMM NAME`
static ACTIVITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d\d)-(\d\d):(\d\d)(\d\d):(\d{4})-(\d\d)-(\d\d):(\d\d)(\d\d)\s*(.*)$")
        .expect("activity pattern is valid")
});

/// Errors from parsing a single log line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line does not follow the log grammar.
    #[error("malformed line: \"{line}\"")]
    MalformedLine { line: String },

    /// The line has both bounds but no activity name yet.
    #[error("activity in progress, no name yet: \"{line}\"")]
    Pending { line: String },

    /// The interval is negative or longer than 48 hours.
    #[error("suspicious duration of {minutes} minutes, are you sure? \"{line}\"")]
    SuspiciousDuration { line: String, minutes: Minute },

    /// A calendar field is out of range.
    #[error("invalid date in \"{line}\": {source}")]
    InvalidDate {
        line: String,
        #[source]
        source: InvalidDateError,
    },
}

/// One interval of the log.
///
/// `day_start` is the start of the *symbolic* day of the activity. It is the
/// midnight of `start` unless the activity was tacked to the previous night
/// (see [`crate::sleep::tack_nights`]), and only makes sense for sleep
/// statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    pub name: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub day_start: Timestamp,
}

impl Activity {
    /// Builds an activity whose symbolic day is the calendar day of `start`.
    pub fn new(name: impl Into<String>, start: Timestamp, end: Timestamp) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            day_start: start.day_start(),
        }
    }

    /// Parses one log line.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let caps = ACTIVITY_RE
            .captures(line)
            .ok_or_else(|| ParseError::MalformedLine {
                line: line.to_string(),
            })?;

        let name = caps[11].trim_end();
        if name.is_empty() {
            return Err(ParseError::Pending {
                line: line.to_string(),
            });
        }

        let field = |i: usize| -> i64 { caps[i].parse().unwrap_or_default() };
        let stamp = |base: usize| {
            Timestamp::new(
                field(base) as i32,
                field(base + 1) as u32,
                field(base + 2) as u32,
                field(base + 3),
                field(base + 4),
            )
            .map_err(|source| ParseError::InvalidDate {
                line: line.to_string(),
                source,
            })
        };

        let start = stamp(1)?;
        let end = stamp(6)?;
        let minutes = end - start;
        if !(0..=MAX_ACTIVITY_MINUTES).contains(&minutes) {
            return Err(ParseError::SuspiciousDuration {
                line: line.to_string(),
                minutes,
            });
        }

        Ok(Self::new(name, start, end))
    }

    /// Length of the interval.
    #[must_use]
    pub fn duration(&self) -> Minute {
        self.end - self.start
    }

    /// Minutes between the symbolic day start and `start`.
    ///
    /// Only meaningful relative to the symbolic day: a tacked activity at
    /// 01:00 has an offset of 25 hours.
    #[must_use]
    pub fn day_offset(&self) -> Minute {
        self.start - self.day_start
    }

    /// Clips the activity to `[start, end)`, borrowing it when fully inside.
    #[must_use]
    pub fn view(&self, start: Timestamp, end: Timestamp) -> Cow<'_, Self> {
        if start <= self.start && end >= self.end {
            return Cow::Borrowed(self);
        }
        Cow::Owned(Self {
            name: self.name.clone(),
            start: self.start.max(start),
            end: self.end.min(end),
            day_start: self.day_start,
        })
    }

    /// Returns a copy attributed to the previous symbolic day.
    #[must_use]
    pub fn tack_to_previous_day(&self) -> Self {
        Self {
            day_start: self.day_start - MINUTES_PER_DAY,
            ..self.clone()
        }
    }

    /// Formats back into the log grammar.
    #[must_use]
    pub fn to_log_line(&self) -> String {
        format!(
            "{}:{} {}",
            self.start.to_log_string(),
            self.end.to_log_string(),
            self.name
        )
    }
}
