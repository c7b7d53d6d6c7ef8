mod daemon;
mod relay;
mod storage;
mod telemetry;


pub use daemon::*;
pub use relay::*;
pub use storage::*;
pub use telemetry::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use camrelay_relay::{ArchiveMode, RelayConfig};
use serde::Deserialize;
use thiserror::Error;

/// Errors loading or validating `camrelay.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{0}")]
    Invalid(String),
}

/// Top-level configuration for the relay daemon, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct CamrelayConfig {
    /// Source directory and upload behaviour.
    #[serde(default)]
    pub relay: RelaySection,
    /// Destination bucket and S3 connection.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Process supervision.
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// OpenTelemetry span export.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl CamrelayConfig {
    /// Parse the file at `path`, or use defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(toml::from_str("")?);
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(&mut self, source: Option<PathBuf>, bucket: Option<String>) {
        if let Some(source) = source {
            self.relay.source_directory = Some(source);
        }
        if let Some(bucket) = bucket {
            self.storage.bucket = Some(bucket);
        }
    }

    /// The destination bucket, which every command that talks to storage
    /// needs.
    pub fn bucket(&self) -> Result<&str, ConfigError> {
        self.storage
            .bucket
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .ok_or(ConfigError::Missing("storage.bucket"))
    }

    /// The watched directory.
    pub fn source_directory(&self) -> Result<&Path, ConfigError> {
        self.relay
            .source_directory
            .as_deref()
            .ok_or(ConfigError::Missing("relay.source_directory"))
    }

    /// Validate the file and build the runtime relay configuration.
    pub fn relay_config(&self) -> Result<RelayConfig, ConfigError> {
        let relay = &self.relay;
        let source_directory = self.source_directory()?.to_path_buf();
        let bucket = self.bucket()?.to_owned();

        if relay.retry_limit == 0 {
            return Err(ConfigError::Invalid(
                "relay.retry_limit must be at least 1".into(),
            ));
        }
        if relay.scan_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "relay.scan_interval_seconds must be at least 1".into(),
            ));
        }
        if relay.max_concurrent_uploads == 0 {
            return Err(ConfigError::Invalid(
                "relay.max_concurrent_uploads must be at least 1".into(),
            ));
        }
        if relay.upload_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "relay.upload_timeout_seconds must be at least 1".into(),
            ));
        }

        let archive = match relay.archive_mode {
            ArchiveModeName::Delete => ArchiveMode::Delete,
            ArchiveModeName::Move => {
                let directory = relay
                    .archive_directory
                    .clone()
                    .ok_or(ConfigError::Missing(
                        "relay.archive_directory (archive_mode = \"move\")",
                    ))?;
                if directory == source_directory {
                    return Err(ConfigError::Invalid(
                        "relay.archive_directory must differ from relay.source_directory".into(),
                    ));
                }
                ArchiveMode::Move { directory }
            }
        };

        Ok(RelayConfig {
            source_directory,
            bucket,
            key_prefix: self.storage.prefix.clone().filter(|p| !p.is_empty()),
            scan_interval: Duration::from_secs(relay.scan_interval_seconds),
            settle_time: Duration::from_secs(relay.settle_seconds),
            retry_limit: relay.retry_limit,
            upload_timeout: Duration::from_secs(relay.upload_timeout_seconds),
            max_concurrent_uploads: relay.max_concurrent_uploads,
            archive,
            ignore_suffixes: relay.ignore_suffixes.clone(),
            watch: relay.watch,
            watch_debounce: Duration::from_millis(relay.watch_debounce_ms),
        })
    }
}
