//! JSON file store and display helpers for the CLI.
//!
//! The store stands in for the backend that owns tasks in production. It keeps
//! the whole database in memory and writes it back atomically. Every write
//! bumps a task's version; a save is refused when a task it changed has moved
//! on disk since it was loaded, and tasks it did not change are taken from disk.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::lifecycle::{TaskEngine, Transition};
use crate::task::Task;

/// In-memory task database.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Database {
    pub tasks: Vec<Task>,
    /// Version of each task as last read from or written to disk.
    #[serde(skip)]
    read_versions: HashMap<u64, u64>,
}

impl Database {
    /// Load the database from a JSON file. A missing file is an empty database;
    /// an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            info!(path = %path.display(), "no task database yet; starting empty");
            return Ok(Database::default());
        }
        let io_err = |source| StoreError::Io { path: path.to_path_buf(), source };
        let mut buf = String::new();
        File::open(path).and_then(|mut f| f.read_to_string(&mut buf)).map_err(io_err)?;
        let mut db: Database = serde_json::from_str(&buf).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        db.mark_read();
        info!(path = %path.display(), tasks = db.tasks.len(), "loaded task database");
        Ok(db)
    }

    /// Merge local changes into the file on disk and write it back.
    ///
    /// Tasks changed here replace their on-disk copy only if that copy still
    /// has the version that was read; otherwise the save fails with
    /// [`StoreError::Conflict`] and nothing is written. Writes go through a temp
    /// file + rename so readers never see a half-written file.
    pub fn save(&mut self, path: &Path) -> Result<(), StoreError> {
        let mut merged = Database::load(path)?;
        for task in &self.tasks {
            let read = self.read_versions.get(&task.id).copied();
            if read == Some(task.version) {
                continue;
            }
            let found = merged.get_mut(task.id);
            match (read, found) {
                (Some(expected), Some(on_disk)) if on_disk.version == expected => {
                    *on_disk = task.clone();
                }
                (None, None) => merged.tasks.push(task.clone()),
                (read, on_disk) => {
                    let expected = read.unwrap_or(0);
                    let found = on_disk.map_or(0, |t| t.version);
                    warn!(task = task.id, expected, found, "task changed on disk; save refused");
                    return Err(StoreError::Conflict { id: task.id, expected, found });
                }
            }
        }
        merged.tasks.sort_by_key(|t| t.id);

        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(&merged).map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let write = || -> std::io::Result<()> {
            let mut f = File::create(&tmp)?;
            f.write_all(data.as_bytes())?;
            f.flush()?;
            fs::rename(&tmp, path)
        };
        write().map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
        info!(path = %path.display(), tasks = merged.tasks.len(), "saved task database");
        self.tasks = merged.tasks;
        self.mark_read();
        Ok(())
    }

    fn mark_read(&mut self) {
        self.read_versions = self.tasks.iter().map(|t| (t.id, t.version)).collect();
    }

    pub fn next_id(&self) -> u64 {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Replace the stored task with `task` if the stored copy is still at
    /// `expected_version`.
    pub fn commit(&mut self, task: Task, expected_version: u64) -> Result<(), StoreError> {
        let id = task.id;
        let stored = self.get_mut(id).ok_or(StoreError::NotFound(id))?;
        if stored.version != expected_version {
            warn!(task = id, expected_version, found = stored.version, "stale write rejected");
            let found = stored.version;
            return Err(StoreError::Conflict { id, expected: expected_version, found });
        }
        *stored = task;
        Ok(())
    }

    /// Read task `id`, apply `transition`, and commit the result.
    pub fn transition<C: Clock>(
        &mut self,
        engine: &TaskEngine<C>,
        id: u64,
        transition: &Transition,
    ) -> Result<&Task, StoreError> {
        let mut task = self.get(id).cloned().ok_or(StoreError::NotFound(id))?;
        let read_version = task.version;
        engine.apply(&mut task, transition)?;
        self.commit(task, read_version)?;
        self.get(id).ok_or(StoreError::NotFound(id))
    }

    /// Hand task `id` to `operator`. Closed tasks keep the operator they
    /// finished under.
    pub fn reassign(&mut self, id: u64, operator: &str) -> Result<&Task, StoreError> {
        let task = self.live_task(id)?;
        if task.assigned_to.as_deref() != Some(operator) {
            task.assigned_to = Some(operator.to_string());
            task.version += 1;
        }
        Ok(&*task)
    }

    /// Move the due date of task `id`. Returns `false` when `due` is already
    /// the due date, in which case nothing changes and the task does not
    /// count as rescheduled.
    pub fn reschedule(&mut self, id: u64, due: NaiveDate) -> Result<bool, StoreError> {
        let task = self.live_task(id)?;
        if task.due == Some(due) {
            return Ok(false);
        }
        task.due = Some(due);
        task.reschedule_count += 1;
        task.version += 1;
        Ok(true)
    }

    fn live_task(&mut self, id: u64) -> Result<&mut Task, StoreError> {
        let task = self.get_mut(id).ok_or(StoreError::NotFound(id))?;
        if task.status.is_terminal() {
            return Err(StoreError::Closed { id, status: task.status });
        }
        Ok(task)
    }

    /// Every task that breaks a lifecycle invariant.
    pub fn verify(&self) -> Vec<StoreError> {
        self.tasks
            .iter()
            .filter_map(|t| {
                t.check_integrity()
                    .err()
                    .map(|problem| StoreError::Integrity { id: t.id, problem })
            })
            .collect()
    }
}

/// Parse a due date: "today", "tomorrow", "in Nd", "in Nw", or YYYY-MM-DD.
pub fn parse_due_input(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();
    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return today.succ_opt(),
        _ => {}
    }
    if let Some(rest) = s.strip_prefix("in ") {
        let rest = rest.trim();
        let offset = if let Some(n) = rest.strip_suffix('d') {
            Duration::try_days(n.trim().parse().ok()?)
        } else if let Some(n) = rest.strip_suffix('w') {
            Duration::try_weeks(n.trim().parse().ok()?)
        } else {
            None
        };
        // Out-of-range offsets are unparseable input, not a crash.
        return today.checked_add_signed(offset?);
    }
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()
}

/// Format seconds as `H:MM:SS`.
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// Print tasks as a table, measuring running tasks up to `now`.
pub fn print_table(tasks: &[&Task], now: DateTime<Utc>) {
    println!(
        "{:<5} {:<12} {:<12} {:<12} {:>10} {:>10}  {}",
        "ID", "Status", "Operator", "Machine", "Active", "Held", "Title"
    );
    for t in tasks {
        println!(
            "{:<5} {:<12} {:<12} {:<12} {:>10} {:>10}  {}",
            t.id,
            t.status,
            truncate(t.assigned_to.as_deref().unwrap_or("-"), 12),
            truncate(t.machine.as_deref().unwrap_or("-"), 12),
            format_duration(t.active_seconds_at(now)),
            format_duration(t.held_seconds_at(now)),
            t.title
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fields::Status;

    fn seeded() -> (Database, TaskEngine<ManualClock>) {
        let engine = TaskEngine::new(ManualClock::at_timestamp(1_700_000_000));
        let mut db = Database::default();
        db.tasks.push(Task::new(1, "Cut blanks", engine.now()));
        db.tasks.push(Task::new(2, "Drill plates", engine.now()));
        (db, engine)
    }

    #[test]
    fn transition_commits_and_bumps_version() {
        let (mut db, engine) = seeded();
        let task = db.transition(&engine, 1, &Transition::Start).unwrap();
        assert_eq!(task.status, Status::InProgress);
        assert_eq!(task.version, 1);
        assert_eq!(db.get(2).map(|t| t.version), Some(0));
    }

    #[test]
    fn stale_commit_is_a_conflict() {
        let (mut db, engine) = seeded();
        let mut first = db.get(1).cloned().unwrap();
        let mut second = first.clone();

        engine.start(&mut first).unwrap();
        db.commit(first, 0).unwrap();

        engine.start(&mut second).unwrap();
        let err = db.commit(second, 0).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { id: 1, expected: 0, found: 1 }));
    }

    #[test]
    fn failed_transition_leaves_store_untouched() {
        let (mut db, engine) = seeded();
        let before = db.get(1).cloned();
        assert!(db.transition(&engine, 1, &Transition::Resume).is_err());
        assert_eq!(db.get(1).cloned(), before);
        assert!(matches!(
            db.transition(&engine, 42, &Transition::Start),
            Err(StoreError::NotFound(42))
        ));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let (mut db, engine) = seeded();
        db.transition(&engine, 2, &Transition::Start).unwrap();
        engine.clock().advance_secs(30);
        db.transition(&engine, 2, &Transition::Hold { reason: "jig missing".into() }).unwrap();
        db.save(&path).unwrap();

        let loaded = Database::load(&path).unwrap();
        assert_eq!(loaded.tasks, db.tasks);
        assert!(!path.with_extension("json.tmp").exists());
    }

    fn saved(engine: &TaskEngine<ManualClock>) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let mut db = Database::default();
        db.tasks.push(Task::new(1, "Cut blanks", engine.now()));
        db.tasks.push(Task::new(2, "Drill plates", engine.now()));
        db.transition(engine, 1, &Transition::Start).unwrap();
        db.save(&path).unwrap();
        (dir, path)
    }

    #[test]
    fn stale_loader_cannot_overwrite_a_newer_write() {
        let engine = TaskEngine::new(ManualClock::at_timestamp(1_700_000_000));
        let (_dir, path) = saved(&engine);
        let mut a = Database::load(&path).unwrap();
        let mut b = Database::load(&path).unwrap();

        engine.clock().advance_secs(60);
        a.transition(&engine, 1, &Transition::Hold { reason: "chuck jammed".into() }).unwrap();
        a.save(&path).unwrap();

        b.transition(&engine, 1, &Transition::Complete).unwrap();
        let err = b.save(&path).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { id: 1, expected: 1, found: 2 }));

        let on_disk = Database::load(&path).unwrap();
        let task = on_disk.get(1).unwrap();
        assert_eq!(task.status, Status::OnHold);
        assert_eq!(task.holds.len(), 1);
        assert_eq!(task.version, 2);
    }

    #[test]
    fn writers_on_different_tasks_both_land() {
        let engine = TaskEngine::new(ManualClock::at_timestamp(1_700_000_000));
        let (_dir, path) = saved(&engine);
        let mut a = Database::load(&path).unwrap();
        let mut b = Database::load(&path).unwrap();

        a.transition(&engine, 1, &Transition::Complete).unwrap();
        a.save(&path).unwrap();
        b.transition(&engine, 2, &Transition::Start).unwrap();
        b.save(&path).unwrap();

        let on_disk = Database::load(&path).unwrap();
        assert_eq!(on_disk.get(1).map(|t| t.status), Some(Status::Completed));
        assert_eq!(on_disk.get(2).map(|t| t.status), Some(Status::InProgress));
        assert_eq!(b.tasks, on_disk.tasks);
    }

    #[test]
    fn concurrent_adds_cannot_share_an_id() {
        let engine = TaskEngine::new(ManualClock::at_timestamp(1_700_000_000));
        let (_dir, path) = saved(&engine);
        let mut a = Database::load(&path).unwrap();
        let mut b = Database::load(&path).unwrap();

        let id = a.next_id();
        a.tasks.push(Task::new(id, "Deburr", engine.now()));
        a.save(&path).unwrap();
        b.tasks.push(Task::new(b.next_id(), "Anodise", engine.now()));
        assert!(matches!(b.save(&path), Err(StoreError::Conflict { id: 3, .. })));

        let on_disk = Database::load(&path).unwrap();
        assert_eq!(on_disk.get(id).map(|t| t.title.as_str()), Some("Deburr"));
    }

    #[test]
    fn reschedule_counts_only_real_changes() {
        let (mut db, _) = seeded();
        let due = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(db.reschedule(1, due).unwrap());
        assert!(!db.reschedule(1, due).unwrap());
        let task = db.get(1).unwrap();
        assert_eq!(task.reschedule_count, 1);
        assert_eq!(task.version, 1);

        assert!(db.reschedule(1, due.succ_opt().unwrap()).unwrap());
        assert_eq!(db.get(1).map(|t| t.reschedule_count), Some(2));
    }

    #[test]
    fn closed_tasks_keep_their_operator_and_due_date() {
        let (mut db, engine) = seeded();
        db.reassign(1, "ana").unwrap();
        db.transition(&engine, 1, &Transition::Start).unwrap();
        db.transition(&engine, 1, &Transition::Complete).unwrap();
        let before = db.get(1).cloned();

        let err = db.reassign(1, "ben").unwrap_err();
        assert!(matches!(err, StoreError::Closed { id: 1, status: Status::Completed }));
        let due = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert!(matches!(db.reschedule(1, due), Err(StoreError::Closed { .. })));
        assert_eq!(db.get(1).cloned(), before);
        assert_eq!(db.get(1).and_then(|t| t.assigned_to.clone()).as_deref(), Some("ana"));
    }

    #[test]
    fn missing_file_is_empty_but_garbage_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        assert!(Database::load(&path).unwrap().tasks.is_empty());

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(Database::load(&path), Err(StoreError::Json { .. })));
    }

    #[test]
    fn verify_reports_inconsistent_tasks() {
        let (mut db, _) = seeded();
        db.tasks[1].status = Status::OnHold;
        let problems = db.verify();
        assert_eq!(problems.len(), 1);
        assert!(matches!(&problems[0], StoreError::Integrity { id: 2, .. }));
    }

    #[test]
    fn due_input_forms() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(parse_due_input("today", today), Some(today));
        assert_eq!(parse_due_input("Tomorrow", today), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_due_input("in 3d", today), NaiveDate::from_ymd_opt(2024, 3, 7));
        assert_eq!(parse_due_input("in 2w", today), NaiveDate::from_ymd_opt(2024, 3, 18));
        assert_eq!(parse_due_input("2024-12-01", today), NaiveDate::from_ymd_opt(2024, 12, 1));
        assert_eq!(parse_due_input("someday", today), None);
    }

    #[test]
    fn out_of_range_due_offset_is_rejected() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(parse_due_input("in 9999999999999d", today), None);
        assert_eq!(parse_due_input("in 99999999w", today), None);
        assert_eq!(parse_due_input("in 99999999999999999999d", today), None);
        assert_eq!(parse_due_input("tomorrow", NaiveDate::MAX), None);
    }

    #[test]
    fn durations_and_truncation() {
        assert_eq!(format_duration(0), "0:00:00");
        assert_eq!(format_duration(3_725), "1:02:05");
        assert_eq!(format_duration(-5), "0:00:00");
        assert_eq!(truncate("lathe", 12), "lathe");
        assert_eq!(truncate("five-axis-mill", 6), "five-…");
    }
}
