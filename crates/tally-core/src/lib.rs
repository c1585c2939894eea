//! Rule-driven classification of time use.
//!
//! This crate contains the pure core of tally:
//! - Time: minute-resolution wall-clock timestamps
//! - Activities: parsing the canonical log and windowed views over it
//! - Rules: compiling the rule file into categories, tags and associations
//! - Classification: aggregating activity time up the category hierarchy
//! - Sleep: night-tacking and per-night statistics
//!
//! Nothing here touches the filesystem; includes are resolved by the caller.

pub mod activity;
pub mod activity_list;
pub mod category;
pub mod color;
pub mod group;
pub mod log;
pub mod rules;
pub mod sleep;
pub mod time;

pub use activity::{Activity, ParseError};
pub use activity_list::ActivityList;
pub use category::{Category, CategoryGraph, CategoryId, Tag, TagGraph, TagId, TOP_CATEGORY};
pub use color::ColorMap;
pub use group::{
    GroupNode, GroupSet, UncategorizedActivities, UncategorizedActivity, classify,
};
pub use log::{LogError, assemble, load_log, parse_log};
pub use rules::{Assoc, RuleError, Rules, compile_rules, expand_includes};
pub use sleep::{Distribution, SleepConfig, SleepStats};
pub use time::{InvalidDateError, Minute, Timestamp};

/// Progress of `current` out of `total` steps, as a percentage.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn progress_percent(current: usize, total: usize) -> u8 {
    ((100 * current) / total.max(1)).min(100) as u8
}
