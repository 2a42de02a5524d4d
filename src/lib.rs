//! # shopclock
//!
//! Task lifecycle and time accounting for shop-floor work.
//!
//! - [`lifecycle`]: the state machine. Tasks move
//!   `pending → in_progress ⇄ on_hold → completed`, can be denied while pending,
//!   and can be force-ended by an admin from any live status.
//! - [`ledger`]: the append-only record of hold intervals kept on every task.
//! - [`metrics`]: performance snapshots, daily/monthly series and
//!   per-operator/per-machine breakdowns built from task snapshots.
//!
//! Time always comes from an injected [`clock::Clock`]:
//!
//! ```
//! use shopclock::clock::ManualClock;
//! use shopclock::lifecycle::TaskEngine;
//! use shopclock::task::Task;
//!
//! let engine = TaskEngine::new(ManualClock::at_timestamp(0));
//! let mut task = Task::new(1, "Face flange", engine.now());
//! engine.start(&mut task).unwrap();
//! engine.clock().advance_secs(600);
//! engine.hold(&mut task, "materials").unwrap();
//! engine.clock().advance_secs(300);
//! engine.resume(&mut task).unwrap();
//! engine.clock().advance_secs(600);
//! engine.complete(&mut task).unwrap();
//!
//! assert_eq!(task.total_duration_seconds, 1_200);
//! assert_eq!(task.total_held_seconds, 300);
//! ```
//!
//! Persistence is someone else's job; [`db`] is a JSON file store used by the
//! bundled CLI and by tests, and [`board`] is an in-memory registry for hosts
//! that drive tasks from several threads.

pub mod board;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod fields;
pub mod ledger;
pub mod lifecycle;
pub mod metrics;
pub mod task;

pub use error::{EngineError, StoreError};
pub use fields::{Action, Capability, Status};
pub use lifecycle::{TaskEngine, Transition};
pub use metrics::PerformanceSnapshot;
pub use task::Task;
