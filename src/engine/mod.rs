// src/engine/mod.rs

//! The scheduling engine behind [`crate::DefaultExecutor`].
//!
//! This module ties together:
//! - the time-ordered priority queue of not-yet-due tasks ([`queue`])
//! - the pure, synchronous core state machine ([`core`]) and its event
//!   handlers ([`event_handlers`])
//! - the async event loop that owns the core and reacts to ([`runtime`]):
//!   - submissions and task completions
//!   - task cancellations
//!   - limit changes and shutdown requests
//!   - the single scheduling timer
//!   - cancellation of the executor's parent token
//!
//! Every mutation of engine state happens on the event loop, one event at a
//! time, in arrival order. External callers talk to it only through
//! [`Event`]s; the ones that need an answer carry a oneshot reply.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::task::{Iteration, TaskFuture, TaskId, TaskRef};

pub(crate) mod core;
pub(crate) mod event_handlers;
pub mod queue;
pub(crate) mod runtime;

pub(crate) use self::core::{CoreCommand, CoreEngine, CoreStep};
pub use queue::{Element, Handle, PriorityQueue};
pub(crate) use runtime::{EventLoop, Shared};

/// Messages flowing into the event loop.
#[derive(Debug)]
pub(crate) enum Event {
    /// A new task passed admission control.
    TaskSubmitted(TaskRef),
    /// A task iteration returned (normally, with an error, or by panicking).
    TaskCompleted { task: TaskRef, iteration: Iteration },
    /// A task was cancelled through its future.
    TaskCanceled(TaskId),
    SetConcurrency {
        value: i64,
        reply: oneshot::Sender<()>,
    },
    SetQueueCapacity {
        value: i64,
        reply: oneshot::Sender<()>,
    },
    QueueLength {
        reply: oneshot::Sender<usize>,
    },
    /// Graceful shutdown. `reply` is `None` when nobody waits for the answer
    /// (parent token cancelled, last handle dropped).
    Cancel {
        reply: Option<oneshot::Sender<bool>>,
    },
    /// Shutdown and hand back every queued task.
    CancelNow {
        reply: oneshot::Sender<Vec<Arc<dyn TaskFuture>>>,
    },
}
