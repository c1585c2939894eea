//! Sleep statistics and the night-tacking pre-pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::activity::Activity;
use crate::time::{Minute, Timestamp};

/// Which activities count as sleep, and where nights begin and end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    /// Name of the main sleep activity.
    pub main_sleep: String,
    /// Name of the nap activity.
    pub nap: String,
    /// Minute of the symbolic day from which a main sleep counts as bedtime.
    pub night_start: Minute,
    /// A main sleep starting before this minute of its calendar day belongs
    /// to the previous night.
    pub tack_cutoff: Minute,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            main_sleep: "Zzz".to_string(),
            nap: "Nap".to_string(),
            night_start: 19 * 60,
            tack_cutoff: 11 * 60,
        }
    }
}

impl SleepConfig {
    #[must_use]
    pub fn is_main_sleep(&self, activity: &Activity) -> bool {
        activity.name == self.main_sleep
    }

    #[must_use]
    pub fn is_sleep(&self, activity: &Activity) -> bool {
        activity.name == self.main_sleep || activity.name == self.nap
    }
}

/// Mean and population standard deviation, rounded to the minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Distribution {
    pub average: Minute,
    pub deviation: Minute,
}

impl Distribution {
    /// Reduces samples; an empty sample gives zeros.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn of(samples: &[Minute]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let n = samples.len() as f64;
        let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
        let variance = samples
            .iter()
            .map(|&s| (s as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        Self {
            average: mean.round() as Minute,
            deviation: variance.sqrt().round() as Minute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SleepStats {
    /// Nights that had at least one main sleep.
    pub nights: usize,
    /// Total sleep per night, naps included.
    pub duration: Distribution,
    /// Offset of bedtime from the start of the symbolic day.
    pub bedtime: Distribution,
}

/// Computes sleep statistics over unclipped activities.
///
/// Sleep is grouped by symbolic day. Days with naps but no main sleep are
/// left out, which also drops an in-progress night at the end of the log.
pub fn sleep_stats<'a>(
    activities: impl IntoIterator<Item = &'a Activity>,
    config: &SleepConfig,
) -> SleepStats {
    let mut days: BTreeMap<Timestamp, Vec<&Activity>> = BTreeMap::new();
    for activity in activities {
        if config.is_sleep(activity) {
            days.entry(activity.day_start).or_default().push(activity);
        }
    }

    let mut durations = Vec::with_capacity(days.len());
    let mut bedtimes = Vec::with_capacity(days.len());
    for sleeps in days.values() {
        if !sleeps.iter().any(|a| config.is_main_sleep(a)) {
            continue;
        }
        durations.push(sleeps.iter().map(|a| a.duration()).sum());
        if let Some(bed) = sleeps
            .iter()
            .find(|a| config.is_main_sleep(a) && a.day_offset() >= config.night_start)
        {
            bedtimes.push(bed.day_offset());
        }
    }

    SleepStats {
        nights: durations.len(),
        duration: Distribution::of(&durations),
        bedtime: Distribution::of(&bedtimes),
    }
}

/// Attributes after-midnight sleep to the previous night.
///
/// Walks activities in chronological order. When a main sleep starts before
/// `tack_cutoff` on its calendar day, it and every earlier activity of that
/// day not tacked yet move to the previous symbolic day.
pub fn tack_nights(activities: &mut [Activity], config: &SleepConfig) {
    let mut current_day: Option<Timestamp> = None;
    let mut untacked_from = 0;

    for i in 0..activities.len() {
        let day = activities[i].start.day_start();
        if current_day != Some(day) {
            current_day = Some(day);
            untacked_from = i;
        }
        let activity = &activities[i];
        if config.is_main_sleep(activity) && activity.start.minute_of_day() < config.tack_cutoff {
            for tacked in &mut activities[untacked_from..=i] {
                *tacked = tacked.tack_to_previous_day();
            }
            untacked_from = i + 1;
        }
    }
}
