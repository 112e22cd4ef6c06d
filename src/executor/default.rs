// src/executor/default.rs

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::model::ExecutorSection;
use crate::engine::{CoreEngine, Event, EventLoop, Shared};
use crate::errors::{Result, SchedexError};
use crate::task::state::{Body, TaskSpec, boxed_body};
use crate::task::{BoxFuture, ProducerFuture, ScheduledFuture, Task, TaskFuture, TaskId};
use crate::types::{ExecutorStatus, TaskKind};

use super::Executor;

/// Far enough ahead to never fire, for delays that overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Event-loop backed [`Executor`].
///
/// Cloning is cheap and every clone drives the same executor. When the last
/// clone is dropped the executor shuts down gracefully: queued and running
/// work still completes.
#[derive(Clone)]
pub struct DefaultExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    events: mpsc::UnboundedSender<Event>,
    shared: Arc<Shared>,
    parent: CancellationToken,
    epoch: Instant,
    next_id: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // The loop may already have terminated.
        let _ = self.events.send(Event::Cancel { reply: None });
    }
}

impl fmt::Debug for DefaultExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultExecutor")
            .field("status", &self.status())
            .field("concurrency", &self.inner.shared.concurrency())
            .field("queue_capacity", &self.inner.shared.capacity())
            .finish_non_exhaustive()
    }
}

impl DefaultExecutor {
    /// Start an executor whose lifetime is bound to `parent`.
    ///
    /// Negative `concurrency` / `queue_capacity` mean unbounded; `0` is valid
    /// and starts the executor paused for that resource. Cancelling `parent`
    /// is the same as calling [`Executor::cancel`], and every task body gets
    /// a child token of it.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime: the event loop is spawned
    /// onto it.
    pub fn new(parent: &CancellationToken, concurrency: i64, queue_capacity: i64) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(concurrency, queue_capacity));

        let event_loop = EventLoop::new(
            CoreEngine::new(concurrency, queue_capacity),
            events_rx,
            events_tx.clone(),
            Arc::clone(&shared),
            parent.clone(),
        );
        tokio::spawn(event_loop.run());

        Self {
            inner: Arc::new(Inner {
                events: events_tx,
                shared,
                parent: parent.clone(),
                epoch: Instant::now(),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Build an executor from the `[executor]` section of a job file.
    pub fn from_config(parent: &CancellationToken, section: &ExecutorSection) -> Self {
        Self::new(parent, section.concurrency, section.queue_capacity)
    }

    pub fn status(&self) -> ExecutorStatus {
        self.inner.shared.status()
    }

    /// Resolves once the executor has terminated, however long that takes.
    pub async fn terminated(&self) {
        self.inner.shared.terminated().await
    }

    /// Admission, task construction and hand-off to the loop.
    fn enqueue<T: Send + Sync + 'static>(
        &self,
        kind: TaskKind,
        body: Body<T>,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<Arc<Task<T>>> {
        let inner = &self.inner;
        inner.shared.admit()?;

        let id = TaskId(inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let now = Instant::now();
        let first_run = now
            .checked_add(initial_delay)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let spec = TaskSpec {
            id,
            kind,
            body,
            first_run,
            delay,
        };
        let task = Task::new(
            spec,
            inner.epoch,
            inner.parent.child_token(),
            inner.events.clone(),
        );

        if inner.events.send(Event::TaskSubmitted(task.clone())).is_err() {
            inner.shared.withdraw();
            debug!(task = %id, "submission rejected: event loop gone");
            return Err(SchedexError::ExecutorCanceled);
        }

        debug!(task = %id, %kind, ?initial_delay, ?delay, "task accepted");
        Ok(task)
    }

    /// Send a request to the loop and wait for its answer.
    async fn request<R>(&self, event: impl FnOnce(oneshot::Sender<R>) -> Event) -> Result<R> {
        let (reply, answer) = oneshot::channel();
        self.inner
            .events
            .send(event(reply))
            .map_err(|_| SchedexError::ExecutorClosed)?;
        answer.await.map_err(|_| SchedexError::ExecutorClosed)
    }
}

impl Executor for DefaultExecutor {
    fn submit<F, Fut>(&self, body: F) -> Result<Arc<dyn TaskFuture>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task = self.enqueue(TaskKind::Once, boxed_body(body), Duration::ZERO, Duration::ZERO)?;
        Ok(task)
    }

    fn submit_producer<T, F, Fut>(&self, body: F) -> Result<Arc<dyn ProducerFuture<T>>>
    where
        T: Send + Sync + 'static,
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let task = self.enqueue(TaskKind::Once, boxed_body(body), Duration::ZERO, Duration::ZERO)?;
        Ok(task)
    }

    fn schedule<F, Fut>(&self, body: F, delay: Duration) -> Result<Arc<dyn ScheduledFuture>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task = self.enqueue(TaskKind::Once, boxed_body(body), delay, delay)?;
        Ok(task)
    }

    fn schedule_with_fixed_delay<F, Fut>(
        &self,
        body: F,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<Arc<dyn ScheduledFuture>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task = self.enqueue(TaskKind::FixedDelay, boxed_body(body), initial_delay, delay)?;
        Ok(task)
    }

    fn schedule_with_fixed_rate<F, Fut>(
        &self,
        body: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<Arc<dyn ScheduledFuture>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task = self.enqueue(TaskKind::FixedRate, boxed_body(body), initial_delay, period)?;
        Ok(task)
    }

    fn concurrency(&self) -> i64 {
        self.inner.shared.concurrency()
    }

    fn set_concurrency(&self, concurrency: i64) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.request(|reply| Event::SetConcurrency {
                value: concurrency,
                reply,
            })
            .await
        })
    }

    fn queue_length(&self) -> BoxFuture<'_, usize> {
        Box::pin(async move {
            // A loop that has exited holds no queued work.
            self.request(|reply| Event::QueueLength { reply })
                .await
                .unwrap_or(0)
        })
    }

    fn queue_capacity(&self) -> i64 {
        self.inner.shared.capacity()
    }

    fn set_queue_capacity(&self, capacity: i64) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.request(|reply| Event::SetQueueCapacity {
                value: capacity,
                reply,
            })
            .await
        })
    }

    fn cancel(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            self.request(|reply| Event::Cancel { reply: Some(reply) })
                .await
                .unwrap_or(false)
        })
    }

    fn cancel_now(&self) -> BoxFuture<'_, Vec<Arc<dyn TaskFuture>>> {
        Box::pin(async move {
            self.request(|reply| Event::CancelNow { reply })
                .await
                .unwrap_or_default()
        })
    }

    fn await_termination(&self, timeout: Duration) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            tokio::time::timeout(timeout, self.inner.shared.terminated())
                .await
                .is_ok()
        })
    }

    fn is_terminated(&self) -> bool {
        self.inner.shared.is_terminated()
    }

    fn is_canceled(&self) -> bool {
        self.status().is_canceled()
    }
}
