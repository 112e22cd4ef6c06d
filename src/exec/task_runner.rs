// src/exec/task_runner.rs

//! Runs individual task iterations off the event loop.

use std::any::Any;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::Event;
use crate::errors::TaskError;
use crate::task::state::Body;
use crate::task::{Iteration, RawTask, TaskFuture, TaskRef};

/// Spawn one iteration of `task` and report back with `TaskCompleted`.
///
/// The event loop has already moved the task to `Running` and counted it.
/// Whatever the body does (return, fail, panic), exactly one
/// `TaskCompleted` is sent so the running count cannot leak.
pub(crate) fn spawn_task(task: TaskRef, events: mpsc::UnboundedSender<Event>) {
    tokio::spawn(async move {
        let id = task.id();
        debug!(task = %id, kind = %task.kind(), "task iteration started");

        let iteration = Arc::clone(&task).run_iteration().await;

        if iteration == Iteration::Finished {
            match task.err() {
                Some(err) if err.code().is_some() => {
                    warn!(task = %id, error = %err, "task body panicked");
                }
                Some(err) => debug!(task = %id, error = %err, "task finished with error"),
                None => debug!(task = %id, "task finished"),
            }
        }

        if events.send(Event::TaskCompleted { task, iteration }).is_err() {
            debug!(task = %id, "event loop gone; dropping completion");
        }
    });
}

/// Run a body on its own Tokio task so a panic is contained there.
///
/// - body error: surfaced as [`TaskError::Failed`] unchanged.
/// - panic: converted to [`TaskError::Panic`] (code `TASK_PANIC`).
/// - aborted by runtime shutdown: reported as cancellation.
pub(crate) async fn run_body<T: Send + 'static>(
    body: Body<T>,
    token: CancellationToken,
) -> Result<T, TaskError> {
    let joined = tokio::spawn(async move { body(token).await }).await;

    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskError::failed(err)),
        Err(err) if err.is_panic() => Err(TaskError::Panic(panic_message(err.into_panic()))),
        Err(_) => Err(TaskError::Canceled),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
