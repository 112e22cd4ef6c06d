// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// How a task is (re)scheduled.
///
/// - `Once`: run a single time, possibly after a delay.
/// - `FixedDelay`: after each run completes, wait `period` before the next.
/// - `FixedRate`: the next run is due `period` after the previous *scheduled*
///   start; an overrunning iteration is followed immediately by one catch-up
///   run (missed ticks are not replayed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Once,
    #[serde(alias = "fixed-delay")]
    FixedDelay,
    #[serde(alias = "fixed-rate")]
    FixedRate,
}

impl TaskKind {
    pub fn is_periodic(self) -> bool {
        !matches!(self, TaskKind::Once)
    }
}

impl Default for TaskKind {
    fn default() -> Self {
        TaskKind::Once
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "once" => Ok(TaskKind::Once),
            "fixed_delay" => Ok(TaskKind::FixedDelay),
            "fixed_rate" => Ok(TaskKind::FixedRate),
            other => Err(format!(
                "invalid task kind: {other} (expected \"once\", \"fixed_delay\" or \"fixed_rate\")"
            )),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Once => "once",
            TaskKind::FixedDelay => "fixed_delay",
            TaskKind::FixedRate => "fixed_rate",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a single task.
///
/// `New -> Running -> Done`, `New -> Done` (cancelled before running),
/// `Running -> Cancelling -> Done`, and for periodic tasks
/// `Running -> New` after each completed iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TaskStatus {
    New = 0,
    Running = 1,
    Cancelling = 2,
    Done = 3,
}

impl TaskStatus {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskStatus::New,
            1 => TaskStatus::Running,
            2 => TaskStatus::Cancelling,
            _ => TaskStatus::Done,
        }
    }
}

/// Lifecycle of an executor. Strictly monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ExecutorStatus {
    Running = 0,
    ShuttingDown = 1,
    WaitingTermination = 2,
    Terminated = 3,
}

impl ExecutorStatus {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ExecutorStatus::Running,
            1 => ExecutorStatus::ShuttingDown,
            2 => ExecutorStatus::WaitingTermination,
            _ => ExecutorStatus::Terminated,
        }
    }

    /// True once shutdown has been requested.
    pub fn is_canceled(self) -> bool {
        self >= ExecutorStatus::ShuttingDown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_kind_parses_common_spellings() {
        assert_eq!("once".parse::<TaskKind>(), Ok(TaskKind::Once));
        assert_eq!("Fixed-Rate".parse::<TaskKind>(), Ok(TaskKind::FixedRate));
        assert_eq!(" fixed_delay ".parse::<TaskKind>(), Ok(TaskKind::FixedDelay));
        assert!("hourly".parse::<TaskKind>().is_err());
    }

    #[test]
    fn statuses_round_trip_through_their_repr() {
        for status in [
            TaskStatus::New,
            TaskStatus::Running,
            TaskStatus::Cancelling,
            TaskStatus::Done,
        ] {
            assert_eq!(TaskStatus::from_u8(status as u8), status);
        }
        assert!(ExecutorStatus::Terminated > ExecutorStatus::WaitingTermination);
        assert!(!ExecutorStatus::Running.is_canceled());
        assert!(ExecutorStatus::ShuttingDown.is_canceled());
    }
}
