// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{Result, SchedexError};
use crate::exec::task_runner::spawn_task;
use crate::task::{RawTask, TaskFuture};
use crate::types::ExecutorStatus;

use super::core::CoreEngine;
use super::{CoreCommand, CoreStep, Event};

/// Counter snapshots published by the event loop after every step.
///
/// Handles read these without talking to the loop: the admission pre-check
/// and the cheap getters. They may lag the loop by one step.
#[derive(Debug)]
pub(crate) struct Shared {
    status: AtomicU8,
    running: AtomicI64,
    queued: AtomicI64,
    /// Submissions sent on the mailbox but not yet stepped by the loop.
    in_flight: AtomicI64,
    concurrency: AtomicI64,
    capacity: AtomicI64,
    terminated: watch::Sender<bool>,
}

impl Shared {
    pub fn new(concurrency: i64, capacity: i64) -> Self {
        Self {
            status: AtomicU8::new(ExecutorStatus::Running as u8),
            running: AtomicI64::new(0),
            queued: AtomicI64::new(0),
            in_flight: AtomicI64::new(0),
            concurrency: AtomicI64::new(concurrency),
            capacity: AtomicI64::new(capacity),
            terminated: watch::channel(false).0,
        }
    }

    pub fn status(&self) -> ExecutorStatus {
        ExecutorStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn concurrency(&self) -> i64 {
        self.concurrency.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> i64 {
        self.capacity.load(Ordering::Acquire)
    }

    /// Best-effort admission pre-check. On success the submission counts as
    /// in flight until the loop has stepped it.
    pub fn admit(&self) -> Result<()> {
        let status = self.status();
        if status.is_canceled() {
            debug!(?status, "submission rejected: executor canceled");
            return Err(SchedexError::ExecutorCanceled);
        }

        let concurrency = self.concurrency();
        let capacity = self.capacity();
        if concurrency >= 0 && capacity >= 0 {
            let running = self.running.load(Ordering::Acquire);
            let queued = self.queued.load(Ordering::Acquire);
            let in_flight = self.in_flight.load(Ordering::Acquire);
            let room = (concurrency - running) + (capacity - queued - in_flight);
            if room < 1 {
                debug!(
                    running,
                    queued, in_flight, concurrency, capacity, "submission rejected: queue full"
                );
                return Err(SchedexError::ExecutorQueueFull);
            }
        }

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Undo [`Shared::admit`] for a submission that never reached the loop.
    pub fn withdraw(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    fn publish(&self, core: &CoreEngine) {
        self.running.store(core.running() as i64, Ordering::Release);
        self.queued.store(core.queue_length() as i64, Ordering::Release);
        self.concurrency.store(core.concurrency(), Ordering::Release);
        self.capacity.store(core.capacity(), Ordering::Release);
        self.status.store(core.status() as u8, Ordering::Release);
    }

    /// Mark the executor terminated even if the loop died without saying so.
    fn mark_terminated(&self) {
        self.status
            .store(ExecutorStatus::Terminated as u8, Ordering::Release);
        self.terminated.send_replace(true);
    }

    pub fn is_terminated(&self) -> bool {
        self.status() == ExecutorStatus::Terminated
    }

    /// Resolves once the executor has terminated.
    pub async fn terminated(&self) {
        let mut rx = self.terminated.subscribe();
        // `self` owns the sender, so the channel cannot close under us.
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// Drives a [`CoreEngine`] from its mailbox, its timer and the parent token.
///
/// This is the IO shell around the core: it owns the only copy of the engine
/// state, spawns task iterations, and keeps [`Shared`] up to date.
pub(crate) struct EventLoop {
    core: CoreEngine,
    events_rx: mpsc::UnboundedReceiver<Event>,
    /// Handed to task runners so they can report completions.
    events_tx: mpsc::UnboundedSender<Event>,
    shared: Arc<Shared>,
    parent: CancellationToken,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl EventLoop {
    pub fn new(
        core: CoreEngine,
        events_rx: mpsc::UnboundedReceiver<Event>,
        events_tx: mpsc::UnboundedSender<Event>,
        shared: Arc<Shared>,
        parent: CancellationToken,
    ) -> Self {
        Self {
            core,
            events_rx,
            events_tx,
            shared,
            parent,
        }
    }

    /// Main event loop.
    ///
    /// - Consumes [`Event`]s in arrival order.
    /// - Fires the scheduling timer at the earliest due time.
    /// - Turns parent-token cancellation into a graceful shutdown.
    /// - Exits once the core reports `Terminated`.
    pub async fn run(mut self) {
        info!(
            concurrency = self.core.concurrency(),
            capacity = self.core.capacity(),
            "executor event loop started"
        );

        let timer = tokio::time::sleep_until(Instant::now());
        tokio::pin!(timer);
        let mut timer_armed = false;
        let mut parent_seen = false;

        loop {
            let (step, submitted) = tokio::select! {
                _ = self.parent.cancelled(), if !parent_seen => {
                    parent_seen = true;
                    info!("parent token cancelled; shutting down executor");
                    (self.core.step(Event::Cancel { reply: None }, Instant::now()), false)
                }
                _ = &mut timer, if timer_armed => {
                    timer_armed = false;
                    (self.core.on_timer(Instant::now()), false)
                }
                event = self.events_rx.recv() => {
                    let Some(event) = event else {
                        info!("executor event channel closed; exiting");
                        break;
                    };
                    let submitted = matches!(event, Event::TaskSubmitted(_));
                    (self.core.step(event, Instant::now()), submitted)
                }
            };

            self.shared.publish(&self.core);
            if submitted {
                self.shared.withdraw();
            }

            if !self.execute(step) {
                info!("core requested exit; stopping event loop");
                break;
            }

            match self.core.next_deadline() {
                Some(deadline) => {
                    if !timer_armed || timer.deadline() != deadline {
                        timer.as_mut().reset(deadline);
                        timer_armed = true;
                    }
                }
                None => timer_armed = false,
            }
        }

        self.reject_leftovers();
        self.shared.mark_terminated();
        info!("executor event loop exiting");
    }

    /// Close the mailbox and settle whatever is still in it.
    ///
    /// A submission can pass admission while a shutdown is still queued
    /// ahead of it; its future must still complete.
    fn reject_leftovers(&mut self) {
        self.events_rx.close();
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                Event::TaskSubmitted(task) => {
                    self.shared.withdraw();
                    warn!(task = %task.id(), "task submitted after termination; cancelling it");
                    task.finish_canceled();
                }
                Event::Cancel { reply } => {
                    if let Some(reply) = reply {
                        let _ = reply.send(false);
                    }
                }
                Event::CancelNow { reply } => {
                    let _ = reply.send(Vec::new());
                }
                Event::QueueLength { reply } => {
                    let _ = reply.send(0);
                }
                // Dropping the reply reports `ExecutorClosed`.
                Event::SetConcurrency { .. } | Event::SetQueueCapacity { .. } => {}
                Event::TaskCompleted { .. } | Event::TaskCanceled(_) => {}
            }
        }
    }

    /// Execute the commands of one step. Returns `keep_running`.
    fn execute(&self, step: CoreStep) -> bool {
        for command in step.commands {
            match command {
                CoreCommand::StartTask(task) => spawn_task(task, self.events_tx.clone()),
                CoreCommand::Reply(reply) => reply.send(),
                CoreCommand::Terminated => {
                    self.shared.terminated.send_replace(true);
                }
            }
        }
        step.keep_running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_counts_in_flight_submissions() {
        let shared = Shared::new(1, 1);
        assert!(shared.admit().is_ok());
        assert!(shared.admit().is_ok());
        assert!(matches!(
            shared.admit(),
            Err(SchedexError::ExecutorQueueFull)
        ));

        shared.withdraw();
        assert!(shared.admit().is_ok());
    }

    #[test]
    fn admit_ignores_budget_when_unbounded() {
        let shared = Shared::new(-1, 0);
        for _ in 0..100 {
            assert!(shared.admit().is_ok());
        }
    }

    #[test]
    fn admit_rejects_after_shutdown() {
        let shared = Shared::new(-1, -1);
        shared.mark_terminated();
        assert!(shared.is_terminated());
        assert!(matches!(
            shared.admit(),
            Err(SchedexError::ExecutorCanceled)
        ));
    }
}
