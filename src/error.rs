//! Error types.
//!
//! [`EngineError`] is what a rejected transition returns; its messages are shown
//! to the user verbatim. [`StoreError`] belongs to the JSON store that stands in
//! for the backend.

use std::path::PathBuf;

use thiserror::Error;

use crate::fields::{Action, Status};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Reasons a transition or ledger operation is refused.
///
/// A task is never modified when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The task's current status does not permit the action.
    #[error("cannot {action} a task that is {from}")]
    InvalidTransition { action: Action, from: Status },

    /// Required input was missing or blank.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A hold interval is already open.
    #[error("a hold interval is already open")]
    AlreadyOpen,

    /// There is no open hold interval to close.
    #[error("no open hold interval to close")]
    NoOpenInterval,

    /// The action needs a privileged caller.
    #[error("permission denied: only an admin may {action} a task")]
    PermissionDenied { action: Action },
}

/// Errors from the JSON task store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed task database {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("task {0} not found")]
    NotFound(u64),

    /// Another writer committed the task since it was read.
    #[error("task {id} was modified concurrently (expected version {expected}, found {found})")]
    Conflict { id: u64, expected: u64, found: u64 },

    /// The task is in a terminal status and can no longer be edited.
    #[error("task {id} is {status} and can no longer be changed")]
    Closed { id: u64, status: Status },

    #[error("task {id} is inconsistent: {problem}")]
    Integrity { id: u64, problem: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}
