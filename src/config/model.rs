// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::types::TaskKind;

/// Job file as read from TOML, before validation.
///
/// ```toml
/// [executor]
/// concurrency = 4
/// queue_capacity = 16
/// shutdown_timeout = "30s"
///
/// [job.heartbeat]
/// cmd = "echo tick"
/// kind = "fixed_rate"
/// initial_delay = "1s"
/// period = "5s"
/// ```
///
/// Durations stay strings here; [`ConfigFile`] holds the parsed values.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub executor: RawExecutorSection,

    /// All jobs from `[job.<name>]`, keyed by job name.
    #[serde(default)]
    pub job: BTreeMap<String, RawJobConfig>,
}

/// `[executor]` section. Negative limits mean unbounded.
#[derive(Debug, Clone, Deserialize)]
pub struct RawExecutorSection {
    #[serde(default = "default_limit")]
    pub concurrency: i64,

    #[serde(default = "default_limit")]
    pub queue_capacity: i64,

    /// How long a Ctrl-C shutdown waits for running jobs before forcing.
    #[serde(default)]
    pub shutdown_timeout: Option<String>,
}

fn default_limit() -> i64 {
    -1
}

impl Default for RawExecutorSection {
    fn default() -> Self {
        Self {
            concurrency: default_limit(),
            queue_capacity: default_limit(),
            shutdown_timeout: None,
        }
    }
}

/// `[job.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawJobConfig {
    /// Shell command, run with `sh -c`.
    pub cmd: String,

    #[serde(default)]
    pub kind: TaskKind,

    #[serde(default)]
    pub initial_delay: Option<String>,

    /// Required for periodic jobs, rejected for `once`.
    #[serde(default)]
    pub period: Option<String>,
}

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Validated job file. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub executor: ExecutorSection,
    pub job: BTreeMap<String, JobConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSection {
    pub concurrency: i64,
    pub queue_capacity: i64,
    pub shutdown_timeout: Duration,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            concurrency: default_limit(),
            queue_capacity: default_limit(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub cmd: String,
    pub kind: TaskKind,
    pub initial_delay: Duration,
    /// Zero for one-shot jobs.
    pub period: Duration,
}

impl ConfigFile {
    /// Assemble a config without validation. Callers outside this module
    /// should go through `TryFrom<RawConfigFile>`.
    pub(crate) fn new_unchecked(
        executor: ExecutorSection,
        job: BTreeMap<String, JobConfig>,
    ) -> Self {
        Self { executor, job }
    }

    pub fn has_periodic_jobs(&self) -> bool {
        self.job.values().any(|job| job.kind.is_periodic())
    }
}

/// Parse a duration like `"250ms"`, `"3s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;
    let unit = unit_part.trim().to_lowercase();

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    };

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(60),
        "h" => secs(60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}
