// src/errors.rs

//! Crate-wide error types.
//!
//! - [`SchedexError`] is what fallible calls on the executor and the config
//!   layer return.
//! - [`TaskError`] is what a finished task reports through its future.

use std::sync::Arc;

use thiserror::Error;

/// Error code attached to a task whose body panicked.
pub const TASK_PANIC: &str = "TASK_PANIC";

#[derive(Error, Debug)]
pub enum SchedexError {
    /// Admission control rejected the task: no room left in the
    /// concurrency + queue budget.
    #[error("executor queue is full")]
    ExecutorQueueFull,

    /// The executor has begun (or finished) shutting down.
    #[error("executor is canceled")]
    ExecutorCanceled,

    /// The event loop is gone and can no longer answer.
    #[error("executor event loop has exited")]
    ExecutorClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SchedexError>;

/// Why a task finished without a value.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// The task was cancelled before it could complete.
    #[error("task canceled")]
    Canceled,

    /// The body panicked; the payload message is kept when it was a string.
    #[error("[TASK_PANIC] task panicked: {0}")]
    Panic(String),

    /// The body returned an error. It is surfaced as-is.
    #[error("{0:#}")]
    Failed(Arc<anyhow::Error>),
}

impl TaskError {
    pub fn failed(err: anyhow::Error) -> Self {
        TaskError::Failed(Arc::new(err))
    }

    /// True for the cancellation sentinel.
    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }

    /// Machine-readable code, currently only set for panics.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            TaskError::Panic(_) => Some(TASK_PANIC),
            _ => None,
        }
    }

    /// The body's own error, if this is a body failure.
    pub fn source_error(&self) -> Option<&anyhow::Error> {
        match self {
            TaskError::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_error_carries_code_and_tag() {
        let err = TaskError::Panic("boom".to_string());
        assert_eq!(err.code(), Some(TASK_PANIC));
        assert!(err.to_string().contains("TASK_PANIC"));
        assert!(err.to_string().contains("boom"));
        assert!(!err.is_canceled());
    }

    #[test]
    fn failed_error_is_surfaced_verbatim() {
        let err = TaskError::failed(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.to_string(), "disk on fire");
        assert_eq!(err.code(), None);
        assert!(err.source_error().is_some());
    }
}
