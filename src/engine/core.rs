// src/engine/core.rs

//! Pure core state machine of the engine.
//!
//! [`CoreEngine`] consumes [`Event`]s together with the current time and
//! produces:
//! - updated engine state (queues, counters, executor status)
//! - a list of [`CoreCommand`]s describing what the async shell must do
//!
//! It has no channels of its own, spawns nothing and never reads the clock,
//! so it can be unit tested deterministically. The shell
//! (`engine::runtime::EventLoop`) reads events, keeps the timer armed at
//! [`CoreEngine::next_deadline`], and spawns the tasks it is told to start.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::engine::Event;
use crate::engine::queue::{Handle, PriorityQueue};
use crate::task::{RawTask, TaskFuture, TaskId, TaskRef};
use crate::types::ExecutorStatus;

/// Command produced by the core, to be executed by the event loop.
#[derive(Debug)]
pub(crate) enum CoreCommand {
    /// The task is now `Running` and counted; spawn its body.
    StartTask(TaskRef),
    /// Answer a caller blocked on the loop. Sent after the step's counters
    /// are published, so the caller observes its own change.
    Reply(Reply),
    /// The executor reached `Terminated`; broadcast it.
    Terminated,
}

/// A pending answer to a synchronous request.
#[derive(Debug)]
pub(crate) enum Reply {
    Ack(oneshot::Sender<()>),
    Flag(oneshot::Sender<bool>, bool),
    Length(oneshot::Sender<usize>, usize),
    Drained(
        oneshot::Sender<Vec<Arc<dyn TaskFuture>>>,
        Vec<Arc<dyn TaskFuture>>,
    ),
}

impl Reply {
    /// Deliver the answer. A caller that gave up waiting is not an error.
    pub fn send(self) {
        match self {
            Reply::Ack(tx) => {
                let _ = tx.send(());
            }
            Reply::Flag(tx, value) => {
                let _ = tx.send(value);
            }
            Reply::Length(tx, value) => {
                let _ = tx.send(value);
            }
            Reply::Drained(tx, value) => {
                let _ = tx.send(value);
            }
        }
    }
}

/// Result of feeding one event into the core.
#[derive(Debug)]
pub(crate) struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the event loop should keep running.
    pub keep_running: bool,
}

/// Which structure currently owns a queued task.
#[derive(Debug, Clone, Copy)]
pub(super) enum Placement {
    Ready(u64),
    Scheduled(Handle),
}

/// Engine state. Only ever touched by the event loop.
#[derive(Debug)]
pub(crate) struct CoreEngine {
    pub(super) status: ExecutorStatus,
    pub(super) concurrency: i64,
    pub(super) capacity: i64,
    pub(super) running: usize,
    /// Due tasks waiting for a free slot, FIFO by insertion key.
    pub(super) ready: BTreeMap<u64, TaskRef>,
    pub(super) next_ready_key: u64,
    /// Tasks that are not due yet, ordered by next run.
    pub(super) scheduled: PriorityQueue<TaskRef>,
    pub(super) placements: HashMap<TaskId, Placement>,
}

impl CoreEngine {
    pub fn new(concurrency: i64, capacity: i64) -> Self {
        Self {
            status: ExecutorStatus::Running,
            concurrency,
            capacity,
            running: 0,
            ready: BTreeMap::new(),
            next_ready_key: 0,
            scheduled: PriorityQueue::new(),
            placements: HashMap::new(),
        }
    }

    pub fn status(&self) -> ExecutorStatus {
        self.status
    }

    pub fn concurrency(&self) -> i64 {
        self.concurrency
    }

    pub fn capacity(&self) -> i64 {
        self.capacity
    }

    pub fn running(&self) -> usize {
        self.running
    }

    /// Tasks waiting in either queue.
    pub fn queue_length(&self) -> usize {
        self.ready.len() + self.scheduled.len()
    }

    /// When the earliest scheduled task becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduled.peek().map(|(task, _)| task.next_run())
    }

    /// Handle a single event, returning the commands for the shell.
    pub fn step(&mut self, event: Event, now: Instant) -> CoreStep {
        let mut commands = Vec::new();

        match event {
            Event::TaskSubmitted(task) => self.handle_submitted(task, now, &mut commands),
            Event::TaskCompleted { task, iteration } => {
                self.handle_completed(task, iteration, now, &mut commands)
            }
            Event::TaskCanceled(id) => self.handle_task_canceled(id),
            Event::SetConcurrency { value, reply } => {
                self.handle_set_concurrency(value, now, &mut commands);
                commands.push(CoreCommand::Reply(Reply::Ack(reply)));
            }
            Event::SetQueueCapacity { value, reply } => {
                self.handle_set_queue_capacity(value);
                commands.push(CoreCommand::Reply(Reply::Ack(reply)));
            }
            Event::QueueLength { reply } => {
                let length = self.queue_length();
                commands.push(CoreCommand::Reply(Reply::Length(reply, length)));
            }
            Event::Cancel { reply } => {
                let changed = self.handle_cancel();
                if let Some(reply) = reply {
                    commands.push(CoreCommand::Reply(Reply::Flag(reply, changed)));
                }
            }
            Event::CancelNow { reply } => {
                let drained = self.handle_cancel_now();
                commands.push(CoreCommand::Reply(Reply::Drained(reply, drained)));
            }
        }

        self.finish_step(commands)
    }

    /// The scheduling timer fired: move every due task on.
    pub fn on_timer(&mut self, now: Instant) -> CoreStep {
        let mut commands = Vec::new();
        self.promote_due(now, &mut commands);
        self.finish_step(commands)
    }

    fn finish_step(&mut self, mut commands: Vec<CoreCommand>) -> CoreStep {
        let keep_running = self.advance_status(&mut commands);
        CoreStep {
            commands,
            keep_running,
        }
    }

    fn has_free_slot(&self) -> bool {
        self.concurrency < 0 || (self.running as i64) < self.concurrency
    }

    /// Dispatch algorithm: park the task if it is not due, start it if a
    /// slot is free, otherwise append it to the ready queue.
    pub(super) fn try_execute(
        &mut self,
        task: TaskRef,
        now: Instant,
        commands: &mut Vec<CoreCommand>,
    ) {
        if task.is_done() {
            return;
        }

        if task.next_run() > now {
            let priority = task.next_run_nanos();
            let id = task.id();
            let handle = self.scheduled.push(task, priority);
            self.placements.insert(id, Placement::Scheduled(handle));
            debug!(task = %id, scheduled = self.scheduled.len(), "task parked until due");
            return;
        }

        if self.has_free_slot() {
            self.start(task, now, commands);
            return;
        }

        let key = self.next_ready_key;
        self.next_ready_key += 1;
        let id = task.id();
        self.ready.insert(key, task);
        self.placements.insert(id, Placement::Ready(key));
        debug!(task = %id, ready = self.ready.len(), "no free slot; task queued");
    }

    fn start(&mut self, task: TaskRef, now: Instant, commands: &mut Vec<CoreCommand>) {
        // Fails only if the task was cancelled concurrently; then it is done.
        if task.set_running(now) {
            self.running += 1;
            debug!(task = %task.id(), running = self.running, "starting task");
            commands.push(CoreCommand::StartTask(task));
        }
    }

    /// Start ready tasks, oldest first, while slots are free.
    pub(super) fn start_ready(&mut self, now: Instant, commands: &mut Vec<CoreCommand>) {
        while self.has_free_slot() {
            let Some((_, task)) = self.ready.pop_first() else {
                break;
            };
            self.placements.remove(&task.id());
            self.start(task, now, commands);
        }
    }

    /// Move every scheduled task whose time has come to dispatch.
    pub(super) fn promote_due(&mut self, now: Instant, commands: &mut Vec<CoreCommand>) {
        while self.next_deadline().is_some_and(|due| due <= now) {
            let Some(element) = self.scheduled.pop() else {
                break;
            };
            self.placements.remove(&element.value.id());
            self.try_execute(element.value, now, commands);
        }
    }

    /// Take a task out of whichever queue holds it. Unknown ids are a no-op:
    /// the task may be running, finished, or already dispatched.
    pub(super) fn unlink(&mut self, id: TaskId) -> bool {
        match self.placements.remove(&id) {
            Some(Placement::Ready(key)) => self.ready.remove(&key).is_some(),
            Some(Placement::Scheduled(handle)) => self.scheduled.remove(handle).is_some(),
            None => false,
        }
    }

    /// Empty both queues, ready tasks first, in the order they would run.
    pub(super) fn drain_queues(&mut self) -> Vec<Arc<dyn TaskFuture>> {
        let mut drained = Vec::with_capacity(self.queue_length());
        while let Some((_, task)) = self.ready.pop_first() {
            drained.push(task.as_future());
        }
        for element in self.scheduled.drain() {
            drained.push(element.value.as_future());
        }
        self.placements.clear();
        drained
    }

    /// `Running -> ShuttingDown`. True only for the call that did it.
    pub(super) fn begin_shutdown(&mut self) -> bool {
        if self.status != ExecutorStatus::Running {
            return false;
        }
        self.status = ExecutorStatus::ShuttingDown;
        info!(
            running = self.running,
            queued = self.queue_length(),
            "executor shutting down"
        );
        true
    }

    /// Walk the executor status forward once shutdown has begun.
    fn advance_status(&mut self, commands: &mut Vec<CoreCommand>) -> bool {
        if self.status == ExecutorStatus::Running || self.status == ExecutorStatus::Terminated {
            return self.status != ExecutorStatus::Terminated;
        }

        if self.queue_length() > 0 {
            return true;
        }

        if self.running > 0 {
            if self.status == ExecutorStatus::ShuttingDown {
                self.status = ExecutorStatus::WaitingTermination;
                info!(running = self.running, "executor waiting for running tasks");
            }
            return true;
        }

        self.status = ExecutorStatus::Terminated;
        info!("executor terminated");
        commands.push(CoreCommand::Terminated);
        false
    }
}
