// src/engine/event_handlers.rs

//! Event handling logic for the core engine.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::core::{CoreCommand, CoreEngine};
use crate::task::{Iteration, RawTask, TaskFuture, TaskId, TaskRef};

impl CoreEngine {
    /// A task passed admission control.
    ///
    /// The pre-check runs outside the loop, so a submission can still arrive
    /// after shutdown began; such a task never runs.
    pub(super) fn handle_submitted(
        &mut self,
        task: TaskRef,
        now: Instant,
        commands: &mut Vec<CoreCommand>,
    ) {
        if self.status.is_canceled() {
            warn!(task = %task.id(), "task submitted after shutdown began; cancelling it");
            task.finish_canceled();
            return;
        }

        debug!(task = %task.id(), kind = %task.kind(), "task submitted");
        self.try_execute(task, now, commands);
    }

    /// A task iteration returned.
    ///
    /// - The running count always drops, whatever the body did.
    /// - A periodic task that wants another round is re-armed and dispatched
    ///   again, unless the executor is shutting down or the task was
    ///   cancelled in the meantime.
    /// - Then the freed slot goes to the oldest ready task.
    pub(super) fn handle_completed(
        &mut self,
        task: TaskRef,
        iteration: Iteration,
        now: Instant,
        commands: &mut Vec<CoreCommand>,
    ) {
        self.running = self.running.saturating_sub(1);

        if iteration == Iteration::Repeat {
            if self.status.is_canceled() {
                debug!(task = %task.id(), "executor shutting down; not re-arming periodic task");
                task.finish_canceled();
            } else if task.configure_next_run(now) {
                self.try_execute(task, now, commands);
            } else {
                debug!(task = %task.id(), "periodic task cancelled during its iteration");
                task.finish_canceled();
            }
        }

        self.start_ready(now, commands);
    }

    /// A task was cancelled through its future: drop it from its queue.
    pub(super) fn handle_task_canceled(&mut self, id: TaskId) {
        let unlinked = self.unlink(id);
        debug!(task = %id, unlinked, queued = self.queue_length(), "task cancel processed");
    }

    pub(super) fn handle_set_concurrency(
        &mut self,
        value: i64,
        now: Instant,
        commands: &mut Vec<CoreCommand>,
    ) {
        info!(old = self.concurrency, new = value, "concurrency changed");
        self.concurrency = value;
        self.start_ready(now, commands);
    }

    pub(super) fn handle_set_queue_capacity(&mut self, value: i64) {
        info!(old = self.capacity, new = value, "queue capacity changed");
        self.capacity = value;
    }

    pub(super) fn handle_cancel(&mut self) -> bool {
        self.begin_shutdown()
    }

    /// Shut down and return every queued task, still `New`. Whether to
    /// cancel them is the caller's decision.
    pub(super) fn handle_cancel_now(&mut self) -> Vec<Arc<dyn TaskFuture>> {
        self.begin_shutdown();
        let drained = self.drain_queues();
        info!(drained = drained.len(), running = self.running, "executor cancelled now");
        drained
    }
}
