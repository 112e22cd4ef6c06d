// src/executor/mod.rs

//! The executor contract.
//!
//! [`Executor`] is what callers program against; [`DefaultExecutor`] is the
//! event-loop backed implementation. Bodies receive a [`CancellationToken`]
//! that is cancelled when their task (or the whole executor) is cancelled;
//! observing it is up to the body.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::task::{BoxFuture, ProducerFuture, ScheduledFuture, TaskFuture};

pub mod default;

pub use default::DefaultExecutor;

/// A cancellable, capacity-bounded task executor.
///
/// Submission calls never wait on the executor: they pass or fail admission
/// control synchronously and return a future for the task. Limits are
/// live-adjustable; a negative limit means unbounded and `0` pauses that
/// resource.
pub trait Executor: Send + Sync {
    /// Run `body` as soon as a slot is free.
    fn submit<F, Fut>(&self, body: F) -> Result<Arc<dyn TaskFuture>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static;

    /// Like [`Executor::submit`], keeping the value the body produces.
    fn submit_producer<T, F, Fut>(&self, body: F) -> Result<Arc<dyn ProducerFuture<T>>>
    where
        T: Send + Sync + 'static,
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static;

    /// Run `body` once, `delay` from now.
    fn schedule<F, Fut>(&self, body: F, delay: Duration) -> Result<Arc<dyn ScheduledFuture>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static;

    /// Run `body` after `initial_delay`, then again `delay` after each
    /// iteration completes.
    fn schedule_with_fixed_delay<F, Fut>(
        &self,
        body: F,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<Arc<dyn ScheduledFuture>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static;

    /// Run `body` after `initial_delay`, then every `period` measured from
    /// the previous scheduled start.
    fn schedule_with_fixed_rate<F, Fut>(
        &self,
        body: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<Arc<dyn ScheduledFuture>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static;

    fn concurrency(&self) -> i64;

    /// Resolves once the executor has applied the new limit.
    fn set_concurrency(&self, concurrency: i64) -> BoxFuture<'_, Result<()>>;

    /// Number of tasks waiting to run, due or not.
    fn queue_length(&self) -> BoxFuture<'_, usize>;

    fn queue_capacity(&self) -> i64;

    /// Resolves once the executor has applied the new limit.
    fn set_queue_capacity(&self, capacity: i64) -> BoxFuture<'_, Result<()>>;

    /// Begin graceful shutdown: reject new work, let running and queued work
    /// finish. True only for the call that started the shutdown.
    fn cancel(&self) -> BoxFuture<'_, bool>;

    /// Shut down and take every queued task out of the executor.
    ///
    /// The returned tasks are left untouched; cancel them if they must not
    /// run. Running tasks keep running.
    fn cancel_now(&self) -> BoxFuture<'_, Vec<Arc<dyn TaskFuture>>>;

    /// Wait up to `timeout` for termination. False on timeout.
    fn await_termination(&self, timeout: Duration) -> BoxFuture<'_, bool>;

    fn is_terminated(&self) -> bool;

    /// True once shutdown has begun.
    fn is_canceled(&self) -> bool;
}
