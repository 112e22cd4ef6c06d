// src/task/state.rs

//! The task state machine and the single [`Task`] type behind every future.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::Event;
use crate::errors::TaskError;
use crate::exec::task_runner::run_body;
use crate::types::{TaskKind, TaskStatus};

use super::future::{BoxFuture, ProducerFuture, ScheduledFuture, TaskFuture};
use super::{Iteration, RawTask, TaskId};

/// A task body: receives the task's cancellation token and produces a value.
pub(crate) type Body<T> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Box a typed async closure into a [`Body`].
pub(crate) fn boxed_body<T, F, Fut>(body: F) -> Body<T>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move |token| -> BoxFuture<'static, anyhow::Result<T>> { Box::pin(body(token)) })
}

/// One unit of work owned by an executor.
///
/// The event loop is the only writer of `next_run` and drives
/// `New <-> Running`; external threads read status and results and may call
/// [`TaskFuture::cancel`], which is why every mutable field is atomic or
/// write-once.
pub struct Task<T> {
    id: TaskId,
    kind: TaskKind,
    delay: Duration,
    epoch: Instant,
    /// Nanoseconds since `epoch`.
    next_run: AtomicI64,
    status: AtomicU8,
    canceled: AtomicBool,
    token: CancellationToken,
    body: Body<T>,
    outcome: OnceLock<Result<T, TaskError>>,
    signal: OnceLock<watch::Sender<bool>>,
    events: mpsc::UnboundedSender<Event>,
}

/// Everything needed to build a [`Task`].
pub(crate) struct TaskSpec<T> {
    pub id: TaskId,
    pub kind: TaskKind,
    pub body: Body<T>,
    pub first_run: Instant,
    pub delay: Duration,
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("status", &self.status())
            .field("canceled", &self.canceled.load(Ordering::Acquire))
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl<T> Task<T> {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::Acquire))
    }
}

impl<T: Send + Sync + 'static> Task<T> {
    pub(crate) fn new(
        spec: TaskSpec<T>,
        epoch: Instant,
        token: CancellationToken,
        events: mpsc::UnboundedSender<Event>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: spec.id,
            kind: spec.kind,
            delay: spec.delay,
            epoch,
            next_run: AtomicI64::new(nanos_since(epoch, spec.first_run)),
            status: AtomicU8::new(TaskStatus::New as u8),
            canceled: AtomicBool::new(false),
            token,
            body: spec.body,
            outcome: OnceLock::new(),
            signal: OnceLock::new(),
            events,
        })
    }

    fn transition(&self, from: TaskStatus, to: TaskStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn signal(&self) -> &watch::Sender<bool> {
        self.signal
            .get_or_init(|| watch::channel(self.outcome.get().is_some()).0)
    }

    /// Publish the result and wake every waiter. Only the first call wins.
    fn publish(&self, result: Result<T, TaskError>) -> bool {
        if self.outcome.set(result).is_err() {
            return false;
        }
        self.status.store(TaskStatus::Done as u8, Ordering::Release);
        self.signal().send_replace(true);
        true
    }

    fn notify_engine(&self) {
        // The loop may already be gone; nothing is left to unlink then.
        let _ = self.events.send(Event::TaskCanceled(self.id));
    }

    /// `Running -> Done` once the body has returned.
    pub(crate) fn set_done(&self, result: Result<T, TaskError>) -> bool {
        let result = if self.canceled.load(Ordering::Acquire) {
            Err(TaskError::Canceled)
        } else {
            result
        };
        self.publish(result)
    }
}

impl<T: Send + Sync + 'static> RawTask for Task<T> {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn status(&self) -> TaskStatus {
        Task::status(self)
    }

    fn next_run(&self) -> Instant {
        let nanos = self.next_run.load(Ordering::Acquire);
        self.epoch + Duration::from_nanos(nanos.max(0) as u64)
    }

    fn next_run_nanos(&self) -> i64 {
        self.next_run.load(Ordering::Acquire)
    }

    fn set_running(&self, now: Instant) -> bool {
        if self.next_run() > now {
            return false;
        }
        self.transition(TaskStatus::New, TaskStatus::Running)
    }

    fn configure_next_run(&self, now: Instant) -> bool {
        debug_assert!(self.kind.is_periodic(), "one-shot task cannot be re-armed");
        if self.status() != TaskStatus::Running {
            return false;
        }

        let next = match self.kind {
            TaskKind::FixedDelay => {
                nanos_since(self.epoch, now).saturating_add(duration_nanos(self.delay))
            }
            TaskKind::FixedRate => {
                fixed_rate_next(self.next_run_nanos(), self.delay, nanos_since(self.epoch, now))
            }
            TaskKind::Once => return false,
        };
        self.next_run.store(next, Ordering::Release);

        self.transition(TaskStatus::Running, TaskStatus::New)
    }

    fn finish_canceled(&self) -> bool {
        self.canceled.store(true, Ordering::Release);
        self.publish(Err(TaskError::Canceled))
    }

    fn run_iteration(self: Arc<Self>) -> BoxFuture<'static, Iteration> {
        Box::pin(async move {
            let result = run_body(Arc::clone(&self.body), self.token.clone()).await;

            match result {
                Ok(_) if self.kind.is_periodic() && !self.canceled.load(Ordering::Acquire) => {
                    Iteration::Repeat
                }
                other => {
                    self.set_done(other);
                    Iteration::Finished
                }
            }
        })
    }

    fn as_future(self: Arc<Self>) -> Arc<dyn TaskFuture> {
        self
    }
}

impl<T: Send + Sync + 'static> TaskFuture for Task<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn cancel(&self) -> bool {
        loop {
            match self.status() {
                TaskStatus::New => {
                    if self.transition(TaskStatus::New, TaskStatus::Done) {
                        self.canceled.store(true, Ordering::Release);
                        self.token.cancel();
                        self.publish(Err(TaskError::Canceled));
                        debug!(task = %self.id, "task cancelled before running");
                        self.notify_engine();
                        return true;
                    }
                }
                TaskStatus::Running => {
                    if self.transition(TaskStatus::Running, TaskStatus::Cancelling) {
                        self.canceled.store(true, Ordering::Release);
                        self.token.cancel();
                        debug!(task = %self.id, "task cancelling while running");
                        self.notify_engine();
                        return true;
                    }
                }
                TaskStatus::Cancelling | TaskStatus::Done => return false,
            }
        }
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    fn is_done(&self) -> bool {
        self.outcome.get().is_some()
    }

    fn err(&self) -> Option<TaskError> {
        match self.outcome.get() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    fn wait(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.is_done() {
                return;
            }
            let mut rx = self.signal().subscribe();
            // The sender lives as long as `self`, so this only ends on `true`.
            let _ = rx.wait_for(|done| *done).await;
        })
    }
}

impl<T: Send + Sync + 'static> ProducerFuture<T> for Task<T> {
    fn value(&self) -> Option<&T> {
        match self.outcome.get() {
            Some(Ok(value)) => Some(value),
            _ => None,
        }
    }
}

impl<T: Send + Sync + 'static> ScheduledFuture for Task<T> {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn delay(&self) -> Duration {
        self.next_run().saturating_duration_since(Instant::now())
    }

    fn period(&self) -> Duration {
        self.delay
    }
}

/// Next tick on the `previous + k * period` grid.
///
/// After an overrun this is the latest tick that is already due, so exactly
/// one catch-up run happens and missed ticks are not replayed.
fn fixed_rate_next(previous: i64, period: Duration, now: i64) -> i64 {
    let period = duration_nanos(period);
    let next = previous.saturating_add(period);
    if period == 0 || next >= now {
        return next;
    }
    let missed = (now - next) / period;
    next.saturating_add(missed.saturating_mul(period))
}

/// Nanoseconds from `epoch` to `at`, clamped to the `i64` range.
pub(crate) fn nanos_since(epoch: Instant, at: Instant) -> i64 {
    duration_nanos(at.saturating_duration_since(epoch))
}

fn duration_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}
