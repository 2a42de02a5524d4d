//! Enumerations shared by the engine and the CLI.
//!
//! `Status` and `Action` together form the single transition table for a task:
//! every lifecycle rule lives in [`Status::after`], nowhere else.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[serde(alias = "Pending")]
    Pending,
    #[serde(alias = "InProgress", alias = "in-progress")]
    InProgress,
    #[serde(alias = "OnHold", alias = "on-hold")]
    OnHold,
    #[serde(alias = "Completed")]
    Completed,
    #[serde(alias = "Denied")]
    Denied,
    #[serde(alias = "Ended")]
    Ended,
}

/// An operation requested against a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Hold,
    Resume,
    Complete,
    Deny,
    End,
}

/// What the caller of a transition is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capability {
    #[default]
    Operator,
    Admin,
}

impl Status {
    /// The status a task lands in when `action` is applied from `self`,
    /// or `None` when the transition is not permitted.
    pub fn after(self, action: Action) -> Option<Status> {
        use Status::*;
        match (self, action) {
            (Pending, Action::Start) => Some(InProgress),
            (Pending, Action::Deny) => Some(Denied),
            (InProgress, Action::Hold) => Some(OnHold),
            (OnHold, Action::Resume) => Some(InProgress),
            (InProgress, Action::Complete) => Some(Completed),
            (Pending | InProgress | OnHold, Action::End) => Some(Ended),
            _ => None,
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Denied | Status::Ended)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::OnHold => "on_hold",
            Status::Completed => "completed",
            Status::Denied => "denied",
            Status::Ended => "ended",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Action {
    /// Actions that only an admin-capable caller may perform.
    pub fn requires_admin(self) -> bool {
        matches!(self, Action::End)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Hold => "hold",
            Action::Resume => "resume",
            Action::Complete => "complete",
            Action::Deny => "deny",
            Action::End => "end",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tasks a report covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReportScope {
    #[default]
    All,
    Operator(String),
    Machine(String),
}

/// Grouping key for per-operator / per-machine breakdowns.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum GroupBy {
    Operator,
    Machine,
}

/// Sort options for task lists.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortKey {
    Id,
    Due,
    Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [Status; 6] = [
        Status::Pending,
        Status::InProgress,
        Status::OnHold,
        Status::Completed,
        Status::Denied,
        Status::Ended,
    ];
    const ALL_ACTIONS: [Action; 6] = [
        Action::Start,
        Action::Hold,
        Action::Resume,
        Action::Complete,
        Action::Deny,
        Action::End,
    ];

    #[test]
    fn terminal_statuses_have_no_successors() {
        for s in ALL_STATUSES.into_iter().filter(|s| s.is_terminal()) {
            for a in ALL_ACTIONS {
                assert_eq!(s.after(a), None, "{s} --{a}--> should be rejected");
            }
        }
    }

    #[test]
    fn complete_only_from_in_progress() {
        for s in ALL_STATUSES {
            let expected = (s == Status::InProgress).then_some(Status::Completed);
            assert_eq!(s.after(Action::Complete), expected);
        }
    }

    #[test]
    fn end_reachable_from_every_live_status() {
        assert_eq!(Status::Pending.after(Action::End), Some(Status::Ended));
        assert_eq!(Status::InProgress.after(Action::End), Some(Status::Ended));
        assert_eq!(Status::OnHold.after(Action::End), Some(Status::Ended));
    }

    #[test]
    fn hold_resume_cycle() {
        assert_eq!(Status::InProgress.after(Action::Hold), Some(Status::OnHold));
        assert_eq!(Status::OnHold.after(Action::Resume), Some(Status::InProgress));
        assert_eq!(Status::OnHold.after(Action::Hold), None);
        assert_eq!(Status::InProgress.after(Action::Start), None);
    }

    #[test]
    fn status_serialises_snake_case() {
        assert_eq!(serde_json::to_string(&Status::OnHold).unwrap(), "\"on_hold\"");
        let s: Status = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(s, Status::InProgress);
    }
}
