//! Configuration module for Tidesync.
//!
//! Typed configuration structs mapping to the YAML configuration file, with
//! loading, defaults and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration for Tidesync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub remote: RemoteConfig,
    pub transfers: TransfersConfig,
    pub retry: RetryConfig,
    pub blacklist: BlacklistConfig,
    pub ignore: IgnoreConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Root directory of the local mirror.
    pub root: PathBuf,
    /// Seconds to wait after a local change before starting a run (debounce).
    pub debounce_delay: u64,
    /// Seconds between remote polling runs in continuous mode.
    pub poll_interval: u64,
}

/// Remote store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote object store.
    pub url: String,
    /// Per-operation network timeout in seconds.
    pub request_timeout: u64,
    /// Listing requests allowed per minute.
    pub list_requests_per_minute: u32,
}

/// Transfer and concurrency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransfersConfig {
    /// Maximum concurrently running propagation jobs.
    pub max_concurrent: usize,
    /// Files above this size (in MiB) are uploaded in resumable chunks.
    pub chunked_upload_threshold_mb: u64,
    /// Size of each upload chunk (in MiB).
    pub chunk_size_mb: u64,
    /// Files above this size (in MiB) attempt delta transfer first.
    pub delta_threshold_mb: u64,
}

/// Retry/backoff settings for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts per job.
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds (doubled per attempt).
    pub base_delay_ms: u64,
}

/// Item-level blacklist (cooldown) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistConfig {
    /// Consecutive failures before a path enters cooldown.
    pub failure_threshold: u32,
    /// Cooldown duration in seconds.
    pub cooldown_secs: u64,
}

/// Ignore / exclusion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Ordered glob patterns; later patterns do not override earlier matches.
    pub patterns: Vec<IgnorePattern>,
}

/// One ignore pattern with its deletion policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnorePattern {
    /// Glob-style pattern, matched against the relative path.
    pub pattern: String,
    /// Whether a matching entry may still be deleted when its directory goes.
    #[serde(default)]
    pub allow_deletion: bool,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync: SyncConfig {
                root: dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("Tidesync"),
                debounce_delay: 3,
                poll_interval: 300,
            },
            remote: RemoteConfig {
                url: String::new(),
                request_timeout: 30,
                list_requests_per_minute: 120,
            },
            transfers: TransfersConfig {
                max_concurrent: 6,
                chunked_upload_threshold_mb: 10,
                chunk_size_mb: 5,
                delta_threshold_mb: 4,
            },
            retry: RetryConfig {
                max_attempts: 5,
                base_delay_ms: 1_000,
            },
            blacklist: BlacklistConfig {
                failure_threshold: 3,
                cooldown_secs: 3_600,
            },
            ignore: IgnoreConfig {
                patterns: vec![
                    IgnorePattern {
                        pattern: "*~".to_string(),
                        allow_deletion: true,
                    },
                    IgnorePattern {
                        pattern: ".*.sw?".to_string(),
                        allow_deletion: true,
                    },
                    IgnorePattern {
                        pattern: ".DS_Store".to_string(),
                        allow_deletion: true,
                    },
                ],
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

macro_rules! impl_section_default {
    ($($section:ty => $field:ident),* $(,)?) => {
        $(impl Default for $section {
            fn default() -> Self {
                Config::default().$field
            }
        })*
    };
}

impl_section_default!(
    SyncConfig => sync,
    RemoteConfig => remote,
    TransfersConfig => transfers,
    RetryConfig => retry,
    BlacklistConfig => blacklist,
    IgnoreConfig => ignore,
    LoggingConfig => logging,
);

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/tidesync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("tidesync")
            .join("config.yaml")
    }

    /// Check internal consistency of loaded values.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.transfers.max_concurrent == 0 {
            anyhow::bail!("transfers.max_concurrent must be at least 1");
        }
        if self.transfers.chunk_size_mb == 0 {
            anyhow::bail!("transfers.chunk_size_mb must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.blacklist.failure_threshold == 0 {
            anyhow::bail!("blacklist.failure_threshold must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert!(config.transfers.max_concurrent >= 1);
        assert!(!config.ignore.patterns.is_empty());
    }

    #[test]
    fn test_load_partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "sync:\n  root: /tmp/mirror\n  debounce_delay: 1\n  poll_interval: 60\nremote:\n  url: https://example.com/store\n  request_timeout: 10\n  list_requests_per_minute: 30\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.sync.root, PathBuf::from("/tmp/mirror"));
        assert_eq!(config.remote.url, "https://example.com/store");
        // Untouched sections keep defaults
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "transfers:\n  max_concurrent: 0\n  chunked_upload_threshold_mb: 10\n  chunk_size_mb: 5\n  delta_threshold_mb: 4\n").unwrap();

        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(config.logging.level, "info");
    }
}
