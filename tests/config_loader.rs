// tests/config_loader.rs

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use schedex::TaskKind;
use schedex::config::{ConfigFile, load_and_validate};
use schedex::errors::SchedexError;
use schedex_test_utils::builders::{ConfigFileBuilder, JobConfigBuilder};

#[test]
fn loads_a_complete_job_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[executor]
concurrency = 4
queue_capacity = 16
shutdown_timeout = "10s"

[job.heartbeat]
cmd = "echo tick"
kind = "fixed_rate"
initial_delay = "1s"
period = "5s"

[job.cleanup]
cmd = "rm -rf /tmp/schedex-scratch"
kind = "fixed-delay"
period = "1h"

[job.warmup]
cmd = "echo warm"
"#
    )
    .unwrap();

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.executor.concurrency, 4);
    assert_eq!(cfg.executor.queue_capacity, 16);
    assert_eq!(cfg.executor.shutdown_timeout, Duration::from_secs(10));
    assert_eq!(cfg.job.len(), 3);

    let heartbeat = &cfg.job["heartbeat"];
    assert_eq!(heartbeat.kind, TaskKind::FixedRate);
    assert_eq!(heartbeat.initial_delay, Duration::from_secs(1));
    assert_eq!(heartbeat.period, Duration::from_secs(5));

    assert_eq!(cfg.job["cleanup"].kind, TaskKind::FixedDelay);
    assert_eq!(cfg.job["warmup"].kind, TaskKind::Once);
    assert!(cfg.has_periodic_jobs());
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_and_validate(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(SchedexError::IoError(_))));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[job.a\ncmd = ").unwrap();

    match load_and_validate(file.path()) {
        Err(SchedexError::TomlError(_)) => {}
        other => panic!("Expected TomlError, got: {:?}", other),
    }
}

#[test]
fn invalid_job_is_a_config_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[job.broken]
cmd = "echo hi"
kind = "fixed_rate"
"#
    )
    .unwrap();

    match load_and_validate(file.path()) {
        Err(SchedexError::ConfigError(msg)) => {
            assert!(msg.contains("broken"));
            assert!(msg.contains("period"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn builders_produce_validated_configs() {
    let cfg: ConfigFile = ConfigFileBuilder::new()
        .with_concurrency(2)
        .with_queue_capacity(0)
        .with_shutdown_timeout("250ms")
        .with_job("once", JobConfigBuilder::new("true").initial_delay("5ms").build())
        .with_job(
            "tick",
            JobConfigBuilder::new("true")
                .kind(TaskKind::FixedDelay)
                .period("1s")
                .build(),
        )
        .build();

    assert_eq!(cfg.executor.concurrency, 2);
    assert_eq!(cfg.executor.queue_capacity, 0);
    assert_eq!(cfg.executor.shutdown_timeout, Duration::from_millis(250));
    assert_eq!(cfg.job["once"].initial_delay, Duration::from_millis(5));
    assert_eq!(cfg.job["tick"].period, Duration::from_secs(1));

    let raw = ConfigFileBuilder::new().raw();
    assert!(ConfigFile::try_from(raw).is_err());
}
