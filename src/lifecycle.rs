//! Task lifecycle state machine.
//!
//! ```text
//! pending ──start──▶ in_progress ──hold──▶ on_hold
//!    │                  │   ▲                 │
//!    │ deny             │   └─────resume──────┘
//!    ▼                  │ complete
//! denied                ▼
//!                   completed
//!
//! pending | in_progress | on_hold ──end (admin)──▶ ended
//! ```
//!
//! All transitions go through [`TaskEngine::apply`], which works on a copy of
//! the task and only swaps it in once every step has succeeded. A rejected
//! transition leaves the task exactly as it was.

use tracing::{debug, warn};

use chrono::{DateTime, Utc};

use crate::clock::{elapsed_secs, Clock};
use crate::error::{EngineError, Result};
use crate::fields::{Action, Capability, Status};
use crate::task::Task;

/// A requested transition with its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Start,
    Hold { reason: String },
    Resume,
    Complete,
    Deny { reason: String },
    End { capability: Capability },
}

impl Transition {
    pub fn action(&self) -> Action {
        match self {
            Transition::Start => Action::Start,
            Transition::Hold { .. } => Action::Hold,
            Transition::Resume => Action::Resume,
            Transition::Complete => Action::Complete,
            Transition::Deny { .. } => Action::Deny,
            Transition::End { .. } => Action::End,
        }
    }
}

/// Applies lifecycle transitions using an injected clock.
#[derive(Debug, Clone, Default)]
pub struct TaskEngine<C> {
    clock: C,
}

impl<C: Clock> TaskEngine<C> {
    pub fn new(clock: C) -> Self {
        TaskEngine { clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn start(&self, task: &mut Task) -> Result<()> {
        self.apply(task, &Transition::Start).map(|_| ())
    }

    pub fn hold(&self, task: &mut Task, reason: &str) -> Result<()> {
        self.apply(task, &Transition::Hold { reason: reason.to_string() }).map(|_| ())
    }

    pub fn resume(&self, task: &mut Task) -> Result<()> {
        self.apply(task, &Transition::Resume).map(|_| ())
    }

    pub fn complete(&self, task: &mut Task) -> Result<()> {
        self.apply(task, &Transition::Complete).map(|_| ())
    }

    pub fn deny(&self, task: &mut Task, reason: &str) -> Result<()> {
        self.apply(task, &Transition::Deny { reason: reason.to_string() }).map(|_| ())
    }

    /// Force-close a task. Only an admin may do this.
    pub fn end(&self, task: &mut Task, capability: Capability) -> Result<()> {
        self.apply(task, &Transition::End { capability }).map(|_| ())
    }

    /// Validate and apply `transition`, returning the new status.
    pub fn apply(&self, task: &mut Task, transition: &Transition) -> Result<Status> {
        let action = transition.action();
        let now = self.clock.now();

        if let Transition::End { capability } = transition {
            if action.requires_admin() && *capability != Capability::Admin {
                warn!(task = task.id, %action, "privileged transition refused");
                return Err(EngineError::PermissionDenied { action });
            }
        }
        let reason = match transition {
            Transition::Hold { reason } | Transition::Deny { reason } => {
                Some(required_reason(reason)?)
            }
            _ => None,
        };

        let from = task.status;
        let to = from
            .after(action)
            .ok_or(EngineError::InvalidTransition { action, from })?;

        let mut next = task.clone();
        match action {
            Action::Start => {
                next.started_at = next.started_at.or(Some(now));
            }
            Action::Hold => {
                accrue_active(&mut next, now);
                next.holds.open(reason.unwrap_or_default(), now).inspect_err(|e| {
                    warn!(task = task.id, error = %e, "hold ledger out of step with status");
                })?;
            }
            Action::Resume => {
                close_hold(&mut next, now, action)?;
            }
            Action::Complete => {
                accrue_active(&mut next, now);
                next.completed_at = Some(now);
            }
            Action::Deny => {
                next.denial_reason = reason.map(str::to_string);
                next.closed_at = Some(now);
            }
            Action::End => {
                match from {
                    Status::InProgress => accrue_active(&mut next, now),
                    Status::OnHold => close_hold(&mut next, now, action)?,
                    _ => {}
                }
                next.closed_at = Some(now);
            }
        }
        next.status = to;
        next.version += 1;
        *task = next;

        debug!(task = task.id, %action, %from, %to, version = task.version, "transition applied");
        Ok(to)
    }
}

fn required_reason(reason: &str) -> Result<&str> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(EngineError::Validation("a reason is required".into()));
    }
    Ok(reason)
}

/// Fold the running active span into `total_duration_seconds`.
fn accrue_active(task: &mut Task, now: DateTime<Utc>) {
    match task.last_active_entry() {
        Some(entry) => task.total_duration_seconds += elapsed_secs(entry, now),
        None => warn!(task = task.id, "in progress without a start time; nothing accrued"),
    }
}

/// Close the open hold and add its length to `total_held_seconds`. A task on
/// hold without an open interval is corrupt; the transition is refused.
fn close_hold(task: &mut Task, now: DateTime<Utc>, action: Action) -> Result<()> {
    match task.holds.close(now) {
        Ok(held) => {
            task.total_held_seconds += held;
            Ok(())
        }
        Err(e) => {
            warn!(task = task.id, %action, error = %e, "on hold without an open interval");
            Err(EngineError::InvalidTransition { action, from: task.status })
        }
    }
}
