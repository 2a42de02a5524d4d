//! Hold-interval ledger.
//!
//! Append-only record of the periods a task spent on hold. Entries are kept in
//! the order they were opened, which is also chronological order; nothing is
//! ever reordered or removed, so the ledger doubles as the task's audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::elapsed_secs;
use crate::error::{EngineError, Result};

/// One hold period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldInterval {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub reason: String,
    /// Set when the interval is closed. While open, use [`HoldInterval::duration_at`].
    #[serde(default)]
    pub duration_seconds: Option<i64>,
}

impl HoldInterval {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Held seconds, measuring an open interval up to `now`.
    pub fn duration_at(&self, now: DateTime<Utc>) -> i64 {
        match (self.end, self.duration_seconds) {
            (Some(_), Some(d)) => d,
            (Some(end), None) => elapsed_secs(self.start, end),
            (None, _) => elapsed_secs(self.start, now),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldLedger {
    intervals: Vec<HoldInterval>,
}

impl HoldLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new interval starting at `at`.
    pub fn open(&mut self, reason: &str, at: DateTime<Utc>) -> Result<&HoldInterval> {
        if self.open_interval().is_some() {
            return Err(EngineError::AlreadyOpen);
        }
        self.intervals.push(HoldInterval {
            start: at,
            end: None,
            reason: reason.to_string(),
            duration_seconds: None,
        });
        Ok(&self.intervals[self.intervals.len() - 1])
    }

    /// Close the open interval at `at` and return its duration in seconds.
    pub fn close(&mut self, at: DateTime<Utc>) -> Result<i64> {
        let interval = self
            .intervals
            .last_mut()
            .filter(|i| i.is_open())
            .ok_or(EngineError::NoOpenInterval)?;
        let duration = elapsed_secs(interval.start, at);
        interval.end = Some(at);
        interval.duration_seconds = Some(duration);
        Ok(duration)
    }

    /// Sum of closed durations plus the open interval measured up to `at`.
    pub fn total_held_seconds(&self, at: DateTime<Utc>) -> i64 {
        self.intervals.iter().map(|i| i.duration_at(at)).sum()
    }

    /// Sum of closed intervals only; this is what `total_held_seconds` caches.
    pub fn closed_held_seconds(&self) -> i64 {
        self.intervals
            .iter()
            .filter(|i| !i.is_open())
            .map(|i| i.duration_at(i.start))
            .sum()
    }

    /// Only the most recent entry can be open.
    pub fn open_interval(&self) -> Option<&HoldInterval> {
        self.intervals.last().filter(|i| i.is_open())
    }

    /// End of the most recently closed interval.
    pub fn last_closed_end(&self) -> Option<DateTime<Utc>> {
        self.intervals.iter().rev().find_map(|i| i.end)
    }

    /// Number of intervals that are open. More than one means the stored data is corrupt.
    pub fn open_count(&self) -> usize {
        self.intervals.iter().filter(|i| i.is_open()).count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HoldInterval> {
        self.intervals.iter()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

impl<'a> IntoIterator for &'a HoldLedger {
    type Item = &'a HoldInterval;
    type IntoIter = std::slice::Iter<'a, HoldInterval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}
