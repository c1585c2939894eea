//! Minute-resolution timestamps in local wall-clock time.
//!
//! A [`Timestamp`] counts minutes since 1970-01-01 00:00 on the local wall
//! clock. There is no timezone or DST handling: the log format records wall
//! time, and every computation (midnights, minute-of-day) is plain integer
//! arithmetic on that count.

use std::fmt;
use std::ops::{Add, Sub};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A signed number of minutes.
pub type Minute = i64;

/// Minutes in a calendar day.
pub const MINUTES_PER_DAY: Minute = 1440;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// A calendar field was outside its accepted range.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidDateError {
    /// A field fell outside the lax range accepted by the log format.
    #[error("{field} out of range: {value} (expected {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// The year/month pair cannot be represented.
    #[error("unrepresentable date {year}-{month:02}")]
    Unrepresentable { year: i32, month: u32 },

    /// A date string did not follow `YYYY-MM-DD`.
    #[error("invalid date \"{value}\", expected YYYY-MM-DD")]
    Unparseable { value: String },
}

fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<(), InvalidDateError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(InvalidDateError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// Minutes since 1970-01-01 00:00, local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(Minute);

impl Timestamp {
    /// Wraps a raw minute count.
    #[must_use]
    pub const fn from_minutes(minutes: Minute) -> Self {
        Self(minutes)
    }

    /// Returns the raw minute count.
    #[must_use]
    pub const fn minutes(self) -> Minute {
        self.0
    }

    /// Builds a timestamp from calendar fields.
    ///
    /// The ranges are deliberately lax so the log can write `24:30` for half
    /// past midnight of the next day or `-1:00` for 23:00 of the previous day.
    /// Day 31 of a shorter month rolls over into the following month.
    pub fn new(
        year: i32,
        month: u32,
        day: u32,
        hour: i64,
        minute: i64,
    ) -> Result<Self, InvalidDateError> {
        check_range("month", i64::from(month), 1, 12)?;
        check_range("day", i64::from(day), 1, 31)?;
        check_range("hour", hour, -23, 48)?;
        check_range("minute", minute, -59, 119)?;

        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or(InvalidDateError::Unrepresentable { year, month })?;
        let days = i64::from(first.num_days_from_ce()) - UNIX_EPOCH_DAYS_FROM_CE
            + i64::from(day)
            - 1;
        Ok(Self(days * MINUTES_PER_DAY + hour * 60 + minute))
    }

    /// Parses a `YYYY-MM-DD` date into the timestamp of its midnight.
    pub fn parse_date(s: &str) -> Result<Self, InvalidDateError> {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            InvalidDateError::Unparseable {
                value: s.to_string(),
            }
        })?;
        Self::new(date.year(), date.month(), date.day(), 0, 0)
    }

    /// Midnight of the calendar day containing this timestamp.
    #[must_use]
    pub const fn day_start(self) -> Self {
        Self(self.0 - self.minute_of_day())
    }

    /// Minutes elapsed since midnight, in `0..1440`.
    #[must_use]
    pub const fn minute_of_day(self) -> Minute {
        self.0.rem_euclid(MINUTES_PER_DAY)
    }

    fn date(self) -> Option<NaiveDate> {
        let days = self.0.div_euclid(MINUTES_PER_DAY) + UNIX_EPOCH_DAYS_FROM_CE;
        i32::try_from(days)
            .ok()
            .and_then(NaiveDate::from_num_days_from_ce_opt)
    }

    /// Formats as `YYYY-MM-DD HH:MM`.
    #[must_use]
    pub fn to_readable_string(self) -> String {
        match self.date() {
            Some(date) => format!(
                "{} {}",
                date.format("%Y-%m-%d"),
                self.to_readable_time_without_date()
            ),
            None => format!("@{}min", self.0),
        }
    }

    /// Formats as `YYYY-MM-DD:HHMM`, the log grammar.
    #[must_use]
    pub fn to_log_string(self) -> String {
        let m = self.minute_of_day();
        match self.date() {
            Some(date) => format!("{}:{:02}{:02}", date.format("%Y-%m-%d"), m / 60, m % 60),
            None => format!("@{}min", self.0),
        }
    }

    /// Formats the time of day as `HH:MM`.
    #[must_use]
    pub fn to_readable_time_without_date(self) -> String {
        let m = self.minute_of_day();
        format!("{:02}:{:02}", m / 60, m % 60)
    }

    /// Returns the day of the month and the weekday, Monday = 0 .. Sunday = 6.
    #[must_use]
    pub fn day_and_weekday(self) -> Option<(u32, u32)> {
        self.date()
            .map(|d| (d.day(), d.weekday().num_days_from_monday()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_readable_string())
    }
}

impl Add<Minute> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Minute) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub<Minute> for Timestamp {
    type Output = Self;

    fn sub(self, rhs: Minute) -> Self {
        Self(self.0 - rhs)
    }
}

impl Sub for Timestamp {
    type Output = Minute;

    fn sub(self, rhs: Self) -> Minute {
        self.0 - rhs.0
    }
}

/// Renders a duration as `HH:MM`; negative durations get a leading `-`.
#[must_use]
pub fn render_duration(minutes: Minute) -> String {
    let sign = if minutes < 0 { "-" } else { "" };
    let abs = minutes.unsigned_abs();
    format!("{sign}{:02}:{:02}", abs / 60, abs % 60)
}

/// Renders a percentage truncated to one decimal, e.g. `12.3%`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn render_percent(percent: f64) -> String {
    if !percent.is_finite() {
        return "0.0%".to_string();
    }
    let tenths = (percent * 10.0) as i64;
    format!("{}.{}%", tenths / 10, (tenths % 10).abs())
}
