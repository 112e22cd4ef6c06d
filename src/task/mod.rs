// src/task/mod.rs

//! Tasks and the futures handed back to callers.
//!
//! - [`future`] defines the public contracts (`TaskFuture`,
//!   `ProducerFuture`, `ScheduledFuture`).
//! - [`state`] implements them with [`Task`], the per-task state machine.
//!
//! The engine itself only sees tasks through the type-erased [`RawTask`]
//! trait, so tasks producing different value types share one event loop.

use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;

use crate::types::{TaskKind, TaskStatus};

pub mod future;
pub mod state;

pub use future::{BoxFuture, ProducerFuture, ScheduledFuture, TaskFuture};
pub use state::Task;

/// Per-executor, monotonically increasing task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What happened to a task after one run of its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Iteration {
    /// Periodic task completed an iteration and wants to be re-armed.
    Repeat,
    /// The task published its final result.
    Finished,
}

/// Engine-facing view of a task, independent of its value type.
pub(crate) trait RawTask: TaskFuture {
    fn kind(&self) -> TaskKind;
    fn status(&self) -> TaskStatus;
    fn next_run(&self) -> Instant;
    /// Next run as nanoseconds since the executor epoch (queue priority).
    fn next_run_nanos(&self) -> i64;
    /// `New -> Running`, only once the task is due.
    fn set_running(&self, now: Instant) -> bool;
    /// `Running -> New` with the next due time computed from the task kind.
    fn configure_next_run(&self, now: Instant) -> bool;
    /// Finish a task the engine decided must not run (any more).
    fn finish_canceled(&self) -> bool;
    /// Run the body once on the current runtime.
    fn run_iteration(self: Arc<Self>) -> BoxFuture<'static, Iteration>;
    fn as_future(self: Arc<Self>) -> Arc<dyn TaskFuture>;
}

pub(crate) type TaskRef = Arc<dyn RawTask>;
