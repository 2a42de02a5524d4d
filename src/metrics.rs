//! Performance reporting over task snapshots.
//!
//! Reports are rebuilt from scratch on every call and never fail: an empty
//! window yields a zero-valued [`PerformanceSnapshot`].
//!
//! Window membership differs by report:
//! - snapshots count tasks *created* inside the window;
//! - series count active time *accrued* inside the window, whenever the task
//!   was created, split on UTC day boundaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::elapsed_secs;
use crate::fields::{GroupBy, ReportScope, Status};
use crate::task::Task;

/// Fixed percentage points taken off every completion percentage.
pub const COMPLETION_DEDUCTION: f64 = 2.0;

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        ReportWindow { start, end }
    }

    /// The calendar month `month` of `year` (UTC). `None` for an invalid month.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self::between(midnight(first), midnight(next)))
    }

    pub fn year(year: i32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let next = NaiveDate::from_ymd_opt(year + 1, 1, 1)?;
        Some(Self::between(midnight(first), midnight(next)))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// A window plus an optional operator or machine filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub window: ReportWindow,
    pub scope: ReportScope,
}

impl ReportQuery {
    pub fn new(window: ReportWindow, scope: ReportScope) -> Self {
        ReportQuery { window, scope }
    }

    fn in_scope(&self, task: &Task) -> bool {
        match &self.scope {
            ReportScope::All => true,
            ReportScope::Operator(op) => task.assigned_to.as_deref() == Some(op.as_str()),
            ReportScope::Machine(m) => task.machine.as_deref() == Some(m.as_str()),
        }
    }

    /// Created inside the window and within scope.
    pub fn matches(&self, task: &Task) -> bool {
        self.window.contains(task.created_at) && self.in_scope(task)
    }
}

/// Aggregate metrics for one operator or machine over one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub on_hold_tasks: u64,
    pub rescheduled_tasks: u64,
    pub avg_time_per_task_seconds: f64,
    pub total_working_duration_seconds: i64,
    pub completion_percentage: f64,
}

/// Order-independent running totals. Tallies over disjoint task sets can be
/// merged in any order and produce the same snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    total: u64,
    completed: u64,
    on_hold: u64,
    rescheduled: u64,
    completed_seconds: i64,
    working_seconds: i64,
}

impl Tally {
    pub fn add(&mut self, task: &Task, now: DateTime<Utc>) {
        self.total += 1;
        match task.status {
            Status::Completed => {
                self.completed += 1;
                self.completed_seconds += task.total_duration_seconds;
            }
            Status::OnHold => self.on_hold += 1,
            _ => {}
        }
        if task.reschedule_count > 0 {
            self.rescheduled += 1;
        }
        self.working_seconds += task.active_seconds_at(now);
    }

    pub fn merge(mut self, other: Tally) -> Tally {
        self.total += other.total;
        self.completed += other.completed;
        self.on_hold += other.on_hold;
        self.rescheduled += other.rescheduled;
        self.completed_seconds += other.completed_seconds;
        self.working_seconds += other.working_seconds;
        self
    }

    pub fn finish(self) -> PerformanceSnapshot {
        let avg = if self.completed == 0 {
            0.0
        } else {
            self.completed_seconds as f64 / self.completed as f64
        };
        PerformanceSnapshot {
            total_tasks: self.total,
            completed_tasks: self.completed,
            on_hold_tasks: self.on_hold,
            rescheduled_tasks: self.rescheduled,
            avg_time_per_task_seconds: avg,
            total_working_duration_seconds: self.working_seconds,
            completion_percentage: completion_percentage(self.completed, self.total),
        }
    }
}

/// `max(0, round(completed / total * 100 - 2, 2))`, or 0 for an empty set.
pub fn completion_percentage(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = completed as f64 / total as f64 * 100.0 - COMPLETION_DEDUCTION;
    let rounded = (raw * 100.0).round() / 100.0;
    if rounded > 0.0 {
        rounded
    } else {
        0.0
    }
}

/// Snapshot of the tasks matching `query`. Running tasks are measured up to `now`.
pub fn aggregate<'a, I>(tasks: I, query: &ReportQuery, now: DateTime<Utc>) -> PerformanceSnapshot
where
    I: IntoIterator<Item = &'a Task>,
{
    tasks
        .into_iter()
        .filter(|t| query.matches(t))
        .fold(Tally::default(), |mut tally, t| {
            tally.add(t, now);
            tally
        })
        .finish()
}

/// One snapshot per operator (or machine) over `window`. Tasks with no
/// operator (or machine) are left out.
pub fn breakdown<'a, I>(
    tasks: I,
    window: &ReportWindow,
    group_by: GroupBy,
    now: DateTime<Utc>,
) -> BTreeMap<String, PerformanceSnapshot>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut groups: BTreeMap<String, Tally> = BTreeMap::new();
    for task in tasks.into_iter().filter(|t| window.contains(t.created_at)) {
        let key = match group_by {
            GroupBy::Operator => task.assigned_to.as_ref(),
            GroupBy::Machine => task.machine.as_ref(),
        };
        if let Some(key) = key {
            groups.entry(key.clone()).or_default().add(task, now);
        }
    }
    groups.into_iter().map(|(k, tally)| (k, tally.finish())).collect()
}

/// Active seconds accrued on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub duration_seconds: i64,
}

/// Active seconds accrued in one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    pub year: i32,
    pub month: u32,
    pub duration_seconds: i64,
}

/// Active time per day inside `query.window`, oldest first. Days with no
/// activity are omitted.
pub fn daily_series<'a, I>(tasks: I, query: &ReportQuery, now: DateTime<Utc>) -> Vec<DailyPoint>
where
    I: IntoIterator<Item = &'a Task>,
{
    accrued_by_day(tasks, query, now)
        .into_iter()
        .map(|(date, duration_seconds)| DailyPoint { date, duration_seconds })
        .collect()
}

/// Active time per month of `year`, oldest first. Empty months are omitted.
pub fn monthly_series<'a, I>(
    tasks: I,
    year: i32,
    scope: ReportScope,
    now: DateTime<Utc>,
) -> Vec<MonthlyPoint>
where
    I: IntoIterator<Item = &'a Task>,
{
    let Some(window) = ReportWindow::year(year) else {
        return Vec::new();
    };
    let query = ReportQuery::new(window, scope);
    let mut months: BTreeMap<(i32, u32), i64> = BTreeMap::new();
    for (date, secs) in accrued_by_day(tasks, &query, now) {
        *months.entry((date.year(), date.month())).or_default() += secs;
    }
    months
        .into_iter()
        .map(|((year, month), duration_seconds)| MonthlyPoint { year, month, duration_seconds })
        .collect()
}

fn accrued_by_day<'a, I>(
    tasks: I,
    query: &ReportQuery,
    now: DateTime<Utc>,
) -> BTreeMap<NaiveDate, i64>
where
    I: IntoIterator<Item = &'a Task>,
{
    let window = query.window;
    let mut days: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for task in tasks.into_iter().filter(|t| query.in_scope(t)) {
        for segment in task.active_segments(now) {
            let mut from = segment.start.max(window.start);
            let to = segment.end.min(window.end);
            while from < to {
                let day = from.date_naive();
                let boundary = day.succ_opt().map(midnight).unwrap_or(to);
                let piece_end = boundary.min(to);
                let secs = elapsed_secs(from, piece_end);
                if secs > 0 {
                    *days.entry(day).or_default() += secs;
                }
                from = piece_end;
            }
        }
    }
    days
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}
