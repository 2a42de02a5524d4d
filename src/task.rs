//! Task record and the timing reads derived from it.
//!
//! `total_duration_seconds` and `total_held_seconds` are caches. They are only
//! written by the lifecycle engine and can always be rebuilt from `started_at`,
//! the hold ledger, and the terminal timestamp.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::elapsed_secs;
use crate::fields::Status;
use crate::ledger::HoldLedger;

/// A unit of shop-floor work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub machine: Option<String>,
    pub status: Status,
    #[serde(default)]
    pub assigned_to: Option<String>,
    /// Planned duration in minutes.
    #[serde(default)]
    pub expected_completion_time: Option<u32>,
    #[serde(default)]
    pub due: Option<NaiveDate>,
    /// How many times the due date was moved after creation. Maintained by the
    /// caller; reports only count it.
    #[serde(default)]
    pub reschedule_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// When the task was denied or ended.
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub denial_reason: Option<String>,
    #[serde(default)]
    pub total_duration_seconds: i64,
    #[serde(default)]
    pub total_held_seconds: i64,
    #[serde(default)]
    pub holds: HoldLedger,
    /// Bumped on every applied transition; used for optimistic concurrency.
    #[serde(default)]
    pub version: u64,
}

/// A span of active (non-held) time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Segment {
    pub fn seconds(&self) -> i64 {
        elapsed_secs(self.start, self.end)
    }
}

impl Task {
    pub fn new(id: u64, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Task {
            id,
            title: title.into(),
            description: None,
            project: None,
            machine: None,
            status: Status::Pending,
            assigned_to: None,
            expected_completion_time: None,
            due: None,
            reschedule_count: 0,
            created_at,
            started_at: None,
            completed_at: None,
            closed_at: None,
            denial_reason: None,
            total_duration_seconds: 0,
            total_held_seconds: 0,
            holds: HoldLedger::new(),
            version: 0,
        }
    }

    /// When the task last entered `in_progress`: the latest resume, or the start.
    pub fn last_active_entry(&self) -> Option<DateTime<Utc>> {
        self.holds.last_closed_end().or(self.started_at)
    }

    /// Active seconds including the running segment when in progress.
    pub fn active_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        let running = match (self.status, self.last_active_entry()) {
            (Status::InProgress, Some(entry)) => elapsed_secs(entry, now),
            _ => 0,
        };
        self.total_duration_seconds + running
    }

    /// Held seconds including the open interval, if any.
    pub fn held_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        self.holds.total_held_seconds(now)
    }

    /// Active spans rebuilt from the start time and the hold ledger. A running
    /// span is cut at `now`.
    pub fn active_segments(&self, now: DateTime<Utc>) -> Vec<Segment> {
        let Some(mut cursor) = self.started_at else {
            return Vec::new();
        };
        let mut segments = Vec::with_capacity(self.holds.len() + 1);
        for hold in &self.holds {
            segments.push(Segment { start: cursor, end: hold.start });
            match hold.end {
                Some(end) => cursor = end,
                None => return segments,
            }
        }
        let close = match self.status {
            Status::InProgress => Some(now),
            Status::Completed => self.completed_at,
            Status::Ended | Status::Denied => self.closed_at,
            Status::Pending | Status::OnHold => None,
        };
        if let Some(end) = close {
            segments.push(Segment { start: cursor, end });
        }
        segments
    }

    /// Active seconds as rebuilt from the ledger; matches `active_seconds_at`.
    pub fn reconstructed_active_seconds(&self, now: DateTime<Utc>) -> i64 {
        self.active_segments(now).iter().map(Segment::seconds).sum()
    }

    /// Check the stored record against the lifecycle invariants.
    pub fn check_integrity(&self) -> Result<(), String> {
        let open = self.holds.open_count();
        if open > 1 {
            return Err(format!("{open} hold intervals are open"));
        }
        if let Some(i) = self.holds.iter().rev().skip(1).find(|i| i.is_open()) {
            return Err(format!("hold opened at {} is open but not the latest", i.start));
        }
        match (self.status == Status::OnHold, open == 1) {
            (true, false) => return Err("status is on_hold but no hold interval is open".into()),
            (false, true) => return Err(format!("status is {} but a hold interval is open", self.status)),
            _ => {}
        }
        if (self.status == Status::Completed) != self.completed_at.is_some() {
            return Err(format!("status {} disagrees with completed_at", self.status));
        }
        if matches!(self.status, Status::InProgress | Status::OnHold | Status::Completed)
            && self.started_at.is_none()
        {
            return Err(format!("status is {} but started_at is unset", self.status));
        }
        if let (Some(start), Some(done)) = (self.started_at, self.completed_at) {
            if done < start {
                return Err("completed_at precedes started_at".into());
            }
        }
        let held = self.holds.closed_held_seconds();
        if held != self.total_held_seconds {
            return Err(format!(
                "total_held_seconds is {} but the ledger sums to {held}",
                self.total_held_seconds
            ));
        }
        let mut segments = self.active_segments(self.created_at);
        if self.status == Status::InProgress {
            segments.pop();
        }
        let active: i64 = segments.iter().map(Segment::seconds).sum();
        if active != self.total_duration_seconds {
            return Err(format!(
                "total_duration_seconds is {} but the ledger rebuilds {active}",
                self.total_duration_seconds
            ));
        }
        Ok(())
    }
}
