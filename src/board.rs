//! In-memory task registry for multi-threaded hosts.
//!
//! Each task sits behind its own mutex, so transitions on one task are
//! serialized while different tasks move independently. The outer map lock is
//! only held long enough to find or insert an entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::debug;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::fields::Status;
use crate::lifecycle::{TaskEngine, Transition};
use crate::task::Task;

type Slot = Arc<Mutex<Task>>;

#[derive(Debug, Default)]
pub struct TaskBoard {
    tasks: RwLock<HashMap<u64, Slot>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let board = Self::new();
        for task in tasks {
            board.insert(task);
        }
        board
    }

    /// Add or replace a task.
    pub fn insert(&self, task: Task) {
        let mut map = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        map.insert(task.id, Arc::new(Mutex::new(task)));
    }

    pub fn len(&self) -> usize {
        self.tasks.read().map(|m| m.len()).unwrap_or_else(|e| e.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: u64) -> Option<Task> {
        let slot = self.slot(id)?;
        let task = lock(&slot).clone();
        Some(task)
    }

    /// Apply `transition` to task `id` while holding that task's lock.
    /// Returns the updated task.
    pub fn transition<C: Clock>(
        &self,
        engine: &TaskEngine<C>,
        id: u64,
        transition: &Transition,
    ) -> Result<Task, StoreError> {
        let slot = self.slot(id).ok_or(StoreError::NotFound(id))?;
        let mut task = lock(&slot);
        let status: Status = engine.apply(&mut task, transition)?;
        debug!(task = id, %status, "board transition");
        Ok(task.clone())
    }

    /// Point-in-time copy of every task, ordered by id.
    pub fn snapshot(&self) -> Vec<Task> {
        let slots: Vec<Slot> = {
            let map = self.tasks.read().unwrap_or_else(|e| e.into_inner());
            map.values().cloned().collect()
        };
        let mut tasks: Vec<Task> = slots.iter().map(|s| lock(s).clone()).collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    fn slot(&self, id: u64) -> Option<Slot> {
        let map = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        map.get(&id).cloned()
    }
}

/// Transitions are all-or-nothing, so a task behind a poisoned lock is still whole.
fn lock(slot: &Slot) -> MutexGuard<'_, Task> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::clock::ManualClock;
    use crate::error::EngineError;
    use crate::fields::Action;

    fn board_with(n: u64, engine: &TaskEngine<Arc<ManualClock>>) -> TaskBoard {
        TaskBoard::from_tasks((1..=n).map(|id| Task::new(id, format!("op {id}"), engine.now())))
    }

    #[test]
    fn unknown_task_is_not_found() {
        let engine = TaskEngine::new(Arc::new(ManualClock::at_timestamp(0)));
        let board = TaskBoard::new();
        let err = board.transition(&engine, 9, &Transition::Start).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(9)));
    }

    #[test]
    fn rejected_transition_surfaces_engine_error() {
        let engine = TaskEngine::new(Arc::new(ManualClock::at_timestamp(0)));
        let board = board_with(1, &engine);
        let err = board.transition(&engine, 1, &Transition::Complete).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Engine(EngineError::InvalidTransition { action: Action::Complete, from: Status::Pending })
        ));
        assert_eq!(board.get(1).map(|t| t.version), Some(0));
    }

    #[test]
    fn tasks_progress_in_parallel() {
        let engine = Arc::new(TaskEngine::new(Arc::new(ManualClock::at_timestamp(0))));
        let board = Arc::new(board_with(8, &*engine));

        let handles: Vec<_> = (1..=8u64)
            .map(|id| {
                let engine = Arc::clone(&engine);
                let board = Arc::clone(&board);
                thread::spawn(move || {
                    board.transition(&*engine, id, &Transition::Start).unwrap();
                    board.transition(&*engine, id, &Transition::Hold { reason: "setup".into() }).unwrap();
                    board.transition(&*engine, id, &Transition::Resume).unwrap();
                    board.transition(&*engine, id, &Transition::Complete).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 8);
        assert!(snapshot.iter().all(|t| t.status == Status::Completed && t.version == 4));
    }

    #[test]
    fn contended_task_never_holds_twice() {
        let engine = Arc::new(TaskEngine::new(Arc::new(ManualClock::at_timestamp(0))));
        let board = Arc::new(board_with(1, &*engine));
        board.transition(&*engine, 1, &Transition::Start).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let board = Arc::clone(&board);
                thread::spawn(move || {
                    let mut applied = 0u64;
                    for _ in 0..50 {
                        let hold = Transition::Hold { reason: "queue".into() };
                        if board.transition(&*engine, 1, &hold).is_ok() {
                            applied += 1;
                        }
                        if board.transition(&*engine, 1, &Transition::Resume).is_ok() {
                            applied += 1;
                        }
                    }
                    applied
                })
            })
            .collect();
        let applied: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        let task = board.get(1).unwrap();
        assert!(task.holds.open_count() <= 1);
        assert_eq!(task.holds.open_count() == 1, task.status == Status::OnHold);
        assert_eq!(task.version, applied + 1);
        assert!(task.check_integrity().is_ok());
    }
}
