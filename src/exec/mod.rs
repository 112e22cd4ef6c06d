// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`task_runner`] runs a single task iteration on its own Tokio task,
//!   contains panics, and reports completion back to the event loop.
//! - [`command`] provides shell-command bodies for the `schedex` binary.

pub mod command;
pub(crate) mod task_runner;

pub use command::{command_body, run_command};
