// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::model::{
    ConfigFile, DEFAULT_SHUTDOWN_TIMEOUT, ExecutorSection, JobConfig, RawConfigFile,
    RawExecutorSection, RawJobConfig, parse_duration,
};
use crate::errors::{Result, SchedexError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SchedexError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_jobs(&raw)?;
        let executor = validate_executor(&raw.executor)?;

        let mut jobs = BTreeMap::new();
        for (name, job) in raw.job {
            let job = validate_job(&name, job)?;
            jobs.insert(name, job);
        }

        Ok(ConfigFile::new_unchecked(executor, jobs))
    }
}

fn ensure_has_jobs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.is_empty() {
        return Err(SchedexError::ConfigError(
            "config must contain at least one [job.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_executor(section: &RawExecutorSection) -> Result<ExecutorSection> {
    let shutdown_timeout = match section.shutdown_timeout.as_deref() {
        Some(raw) => parse_field("[executor].shutdown_timeout", raw)?,
        None => DEFAULT_SHUTDOWN_TIMEOUT,
    };

    Ok(ExecutorSection {
        concurrency: section.concurrency,
        queue_capacity: section.queue_capacity,
        shutdown_timeout,
    })
}

fn validate_job(name: &str, job: RawJobConfig) -> Result<JobConfig> {
    if job.cmd.trim().is_empty() {
        return Err(SchedexError::ConfigError(format!(
            "job '{name}' has an empty `cmd`"
        )));
    }

    let initial_delay = match job.initial_delay.as_deref() {
        Some(raw) => parse_field(&format!("job '{name}' initial_delay"), raw)?,
        None => Duration::ZERO,
    };

    let period = match (job.kind.is_periodic(), job.period.as_deref()) {
        (true, Some(raw)) => {
            let period = parse_field(&format!("job '{name}' period"), raw)?;
            if period.is_zero() {
                return Err(SchedexError::ConfigError(format!(
                    "job '{name}' is {} and needs a non-zero `period`",
                    job.kind
                )));
            }
            period
        }
        (true, None) => {
            return Err(SchedexError::ConfigError(format!(
                "job '{name}' is {} and needs a `period`",
                job.kind
            )));
        }
        (false, Some(_)) => {
            return Err(SchedexError::ConfigError(format!(
                "job '{name}' runs once and cannot set `period`"
            )));
        }
        (false, None) => Duration::ZERO,
    };

    Ok(JobConfig {
        cmd: job.cmd,
        kind: job.kind,
        initial_delay,
        period,
    })
}

fn parse_field(field: &str, raw: &str) -> Result<Duration> {
    parse_duration(raw)
        .map_err(|e| SchedexError::ConfigError(format!("{field}: {e}")))
}
