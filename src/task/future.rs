// src/task/future.rs

//! Public handles to submitted work.
//!
//! Callers never see the engine's internals; they hold one of these traits:
//! - [`TaskFuture`]: completion, error, cancellation.
//! - [`ProducerFuture`]: additionally exposes the produced value.
//! - [`ScheduledFuture`]: additionally exposes scheduling information.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::errors::TaskError;
use crate::types::TaskKind;

use super::TaskId;

/// Boxed, sendable future used at the crate's async trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait TaskFuture: Send + Sync + fmt::Debug {
    fn id(&self) -> TaskId;

    /// Request cancellation.
    ///
    /// Returns `false` if the task is already cancelling or finished. A task
    /// that has not started yet finishes immediately with
    /// [`TaskError::Canceled`]; a running task has its token cancelled and
    /// finishes once its body returns.
    fn cancel(&self) -> bool;

    fn is_canceled(&self) -> bool;

    fn is_done(&self) -> bool;

    /// The error the task finished with, if any. `None` while running.
    fn err(&self) -> Option<TaskError>;

    /// Resolves once the task is done. Safe to call from many observers,
    /// before or after completion.
    fn wait(&self) -> BoxFuture<'_, ()>;
}

pub trait ProducerFuture<T>: TaskFuture {
    /// The produced value, once the task finished successfully.
    fn value(&self) -> Option<&T>;
}

pub trait ScheduledFuture: TaskFuture {
    fn kind(&self) -> TaskKind;

    /// Time left until the next run is due; zero if it is already due.
    fn delay(&self) -> Duration;

    /// The period for repeating tasks, the initial delay for one-shots.
    fn period(&self) -> Duration;
}
