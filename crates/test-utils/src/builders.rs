use std::collections::BTreeMap;

use schedex::TaskKind;
use schedex::config::model::{RawConfigFile, RawExecutorSection, RawJobConfig};
use schedex::config::ConfigFile;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                executor: RawExecutorSection::default(),
                job: BTreeMap::new(),
            },
        }
    }

    pub fn with_job(mut self, name: &str, job: RawJobConfig) -> Self {
        self.config.job.insert(name.to_string(), job);
        self
    }

    pub fn with_concurrency(mut self, concurrency: i64) -> Self {
        self.config.executor.concurrency = concurrency;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: i64) -> Self {
        self.config.executor.queue_capacity = capacity;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: &str) -> Self {
        self.config.executor.shutdown_timeout = Some(timeout.to_string());
        self
    }

    /// The raw, unvalidated config.
    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a `[job.<name>]` section.
pub struct JobConfigBuilder {
    job: RawJobConfig,
}

impl JobConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            job: RawJobConfig {
                cmd: cmd.to_string(),
                kind: TaskKind::Once,
                initial_delay: None,
                period: None,
            },
        }
    }

    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.job.kind = kind;
        self
    }

    pub fn initial_delay(mut self, delay: &str) -> Self {
        self.job.initial_delay = Some(delay.to_string());
        self
    }

    pub fn period(mut self, period: &str) -> Self {
        self.job.period = Some(period.to_string());
        self
    }

    pub fn build(self) -> RawJobConfig {
        self.job
    }
}
