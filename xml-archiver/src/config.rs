//! Agent configuration.
//!
//! Defaults reproduce the classic deployment: watch the working directory,
//! archive into `xml_archive.zip` next to it, settle after five one-second
//! ticks and retry failed commits forever once per second.

use crate::archive::DEFAULT_ARCHIVE_NAME;
use crate::delivery::{RetryPolicy, DEFAULT_RETRY_DELAY};
use crate::instance::DEFAULT_LOCK_NAME;
use crate::settle::{DEFAULT_SETTLE_TICKS, DEFAULT_TICK_INTERVAL};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Overrides the watched directory.
pub const ENV_WATCH_DIR: &str = "XML_ARCHIVER_WATCH_DIR";
/// Overrides the archive path.
pub const ENV_ARCHIVE: &str = "XML_ARCHIVER_ARCHIVE";
/// Overrides the number of quiet ticks before a file settles.
pub const ENV_SETTLE_TICKS: &str = "XML_ARCHIVER_SETTLE_TICKS";
/// Bounds the number of commit attempts per file.
pub const ENV_MAX_ATTEMPTS: &str = "XML_ARCHIVER_MAX_ATTEMPTS";

/// Errors in configuration values.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Everything the agent needs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Directory watched recursively for XML writes.
    pub watch_dir: PathBuf,
    /// The archive file.
    pub archive_path: PathBuf,
    /// Quiet ticks before a file counts as settled.
    pub settle_ticks: u32,
    /// Period of the settle ticker.
    pub tick_interval: Duration,
    /// What to do when a commit fails.
    pub retry: RetryPolicy,
    /// Name of the machine-wide singleton lock.
    pub lock_name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("."),
            archive_path: PathBuf::from(DEFAULT_ARCHIVE_NAME),
            settle_ticks: DEFAULT_SETTLE_TICKS,
            tick_interval: DEFAULT_TICK_INTERVAL,
            retry: RetryPolicy::unbounded(DEFAULT_RETRY_DELAY),
            lock_name: DEFAULT_LOCK_NAME.to_string(),
        }
    }
}

impl AgentConfig {
    /// Start building a config from the defaults.
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Apply `XML_ARCHIVER_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| env::var(var).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_WATCH_DIR) {
            self.watch_dir = PathBuf::from(dir);
        }
        if let Some(archive) = lookup(ENV_ARCHIVE) {
            self.archive_path = PathBuf::from(archive);
        }
        if let Some(value) = lookup(ENV_SETTLE_TICKS) {
            self.settle_ticks = parse_positive(ENV_SETTLE_TICKS, value)?;
        }
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            let max = parse_positive(ENV_MAX_ATTEMPTS, value)?;
            self.retry = RetryPolicy::bounded(self.retry.delay, max);
        }
        Ok(self)
    }
}

fn parse_positive(var: &'static str, value: String) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber { var, value }),
    }
}

/// Builder for [`AgentConfig`] with sensible defaults.
#[derive(Debug, Default)]
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    pub fn watch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.watch_dir = dir.into();
        self
    }

    pub fn archive_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.archive_path = path.into();
        self
    }

    pub fn settle_ticks(mut self, ticks: u32) -> Self {
        self.config.settle_ticks = ticks.max(1);
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.config.tick_interval = interval;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn lock_name(mut self, name: impl Into<String>) -> Self {
        self.config.lock_name = name.into();
        self
    }

    pub fn build(self) -> AgentConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let vars: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.watch_dir, PathBuf::from("."));
        assert_eq!(config.archive_path, PathBuf::from("xml_archive.zip"));
        assert_eq!(config.settle_ticks, 5);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.retry, RetryPolicy::unbounded(Duration::from_secs(1)));
        assert_eq!(config.lock_name, "EBCOM_XML_ARCHIVER");
    }

    #[test]
    fn test_builder_overrides() {
        let config = AgentConfig::builder()
            .watch_dir("/srv/inbox")
            .settle_ticks(0)
            .tick_interval(Duration::from_millis(250))
            .build();

        assert_eq!(config.watch_dir, PathBuf::from("/srv/inbox"));
        assert_eq!(config.settle_ticks, 1);
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.archive_path, PathBuf::from("xml_archive.zip"));
    }

    #[test]
    fn test_env_overrides() {
        let config = AgentConfig::default()
            .with_overrides(lookup(&[
                (ENV_ARCHIVE, "/data/all.zip"),
                (ENV_SETTLE_TICKS, "3"),
                (ENV_MAX_ATTEMPTS, "10"),
            ]))
            .unwrap();

        assert_eq!(config.archive_path, PathBuf::from("/data/all.zip"));
        assert_eq!(config.settle_ticks, 3);
        assert_eq!(config.retry.max_attempts, Some(10));
        assert_eq!(config.watch_dir, PathBuf::from("."));
    }

    #[test]
    fn test_invalid_env_number() {
        let err = AgentConfig::default()
            .with_overrides(lookup(&[(ENV_SETTLE_TICKS, "zero")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                var: ENV_SETTLE_TICKS,
                value: "zero".to_string()
            }
        );

        assert!(AgentConfig::default()
            .with_overrides(lookup(&[(ENV_MAX_ATTEMPTS, "0")]))
            .is_err());
    }
}
