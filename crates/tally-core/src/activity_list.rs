//! Windowed views over a chronologically sorted activity sequence.

use std::borrow::Cow;
use std::sync::Arc;

use crate::activity::Activity;
use crate::sleep::{self, SleepConfig, SleepStats};
use crate::time::Timestamp;

/// Sorted activities, optionally restricted to a `[start, end)` window.
///
/// Views share the backing storage; only the window changes.
#[derive(Debug, Clone)]
pub struct ActivityList {
    activities: Arc<[Activity]>,
    window: Option<(Timestamp, Timestamp)>,
}

impl ActivityList {
    /// Wraps activities sorted by start time.
    #[must_use]
    pub fn new(activities: Vec<Activity>) -> Self {
        debug_assert!(activities.windows(2).all(|w| w[0].start <= w[1].start));
        Self {
            activities: activities.into(),
            window: None,
        }
    }

    /// Restricts to activities overlapping `[start, end)`.
    #[must_use]
    pub fn view(&self, start: Timestamp, end: Timestamp) -> Self {
        Self {
            activities: Arc::clone(&self.activities),
            window: Some((start, end)),
        }
    }

    fn bounds(&self) -> (usize, usize) {
        match self.window {
            None => (0, self.activities.len()),
            Some((start, end)) => {
                let first = self.activities.partition_point(|a| a.end <= start);
                let last = self.activities.partition_point(|a| a.start < end);
                (first, last.max(first))
            }
        }
    }

    /// The activities of the window, unclipped.
    #[must_use]
    pub fn raw(&self) -> &[Activity] {
        let (first, last) = self.bounds();
        &self.activities[first..last]
    }

    /// Iterates the window, clipping activities that straddle its bounds.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Cow<'_, Activity>> {
        let window = self.window;
        self.raw().iter().map(move |a| match window {
            Some((start, end)) => a.view(start, end),
            None => Cow::Borrowed(a),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let (first, last) = self.bounds();
        last - first
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Window start, or the start of the first activity.
    #[must_use]
    pub fn start_date(&self) -> Option<Timestamp> {
        self.window
            .map(|(start, _)| start)
            .or_else(|| self.activities.first().map(|a| a.start))
    }

    /// Window end, or the end of the last activity.
    #[must_use]
    pub fn end_date(&self) -> Option<Timestamp> {
        self.window
            .map(|(_, end)| end)
            .or_else(|| self.activities.last().map(|a| a.end))
    }

    /// Sleep statistics over the window.
    ///
    /// Uses unclipped activities so a night cut by the window edge still
    /// counts in full.
    #[must_use]
    pub fn sleep_stats(&self, config: &SleepConfig) -> SleepStats {
        sleep::sleep_stats(self.raw(), config)
    }
}
