use std::path::PathBuf;
use std::time::Duration;

use crate::archive::ArchiveMode;
use crate::error::RelayError;

/// Suffixes FTP servers and clients use for partially written files.
pub const DEFAULT_IGNORE_SUFFIXES: &[&str] = &[".part", ".tmp", ".filepart"];

/// Runtime configuration for a [`Relay`](crate::Relay).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Directory the FTP server writes captures into.
    pub source_directory: PathBuf,
    /// Destination bucket.
    pub bucket: String,
    /// Optional key prefix prepended to every object key.
    pub key_prefix: Option<String>,
    /// Delay between scan passes.
    pub scan_interval: Duration,
    /// Extra time a file's size and modification time must stay unchanged,
    /// beyond being seen identical on two consecutive passes.
    pub settle_time: Duration,
    /// Transient failures allowed per file before it is marked failed.
    pub retry_limit: u32,
    /// Upper bound on a single `put_object` call.
    pub upload_timeout: Duration,
    /// Uploads allowed to run at the same time.
    pub max_concurrent_uploads: usize,
    /// What happens to a local file after its upload is confirmed.
    pub archive: ArchiveMode,
    /// File-name suffixes never considered for upload.
    pub ignore_suffixes: Vec<String>,
    /// Wake the scan loop on filesystem events in addition to the interval.
    pub watch: bool,
    /// Quiet period after a filesystem event before a pass is started.
    pub watch_debounce: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            source_directory: PathBuf::from("/srv/ftp"),
            bucket: String::new(),
            key_prefix: None,
            scan_interval: Duration::from_secs(10),
            settle_time: Duration::ZERO,
            retry_limit: 5,
            upload_timeout: Duration::from_secs(60),
            max_concurrent_uploads: 1,
            archive: ArchiveMode::Delete,
            ignore_suffixes: DEFAULT_IGNORE_SUFFIXES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            watch: false,
            watch_debounce: Duration::from_millis(500),
        }
    }
}

impl RelayConfig {
    /// Check invariants that would otherwise surface as confusing runtime
    /// behaviour.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.bucket.trim().is_empty() {
            return Err(RelayError::Configuration(
                "destination bucket is not set".into(),
            ));
        }
        if self.retry_limit == 0 {
            return Err(RelayError::Configuration(
                "retry_limit must be at least 1".into(),
            ));
        }
        if self.scan_interval < Duration::from_secs(1) {
            return Err(RelayError::Configuration(
                "scan_interval must be at least one second".into(),
            ));
        }
        if self.max_concurrent_uploads == 0 {
            return Err(RelayError::Configuration(
                "max_concurrent_uploads must be at least 1".into(),
            ));
        }
        if self.upload_timeout.is_zero() {
            return Err(RelayError::Configuration(
                "upload_timeout must be greater than zero".into(),
            ));
        }
        if let ArchiveMode::Move { directory } = &self.archive {
            if directory == &self.source_directory {
                return Err(RelayError::Configuration(
                    "archive directory must differ from the source directory".into(),
                ));
            }
        }
        Ok(())
    }

    /// The archive directory when it lives inside the source tree and must
    /// therefore be skipped by the scanner.
    pub(crate) fn nested_archive_dir(&self) -> Option<PathBuf> {
        match &self.archive {
            ArchiveMode::Move { directory } if directory.starts_with(&self.source_directory) => {
                Some(directory.clone())
            }
            _ => None,
        }
    }

    pub(crate) fn is_ignored(&self, file_name: &str) -> bool {
        self.ignore_suffixes
            .iter()
            .any(|suffix| file_name.ends_with(suffix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RelayConfig {
        RelayConfig {
            bucket: "captures".into(),
            ..RelayConfig::default()
        }
    }

    #[test]
    fn defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.retry_limit, 5);
        assert_eq!(config.max_concurrent_uploads, 1);
        assert_eq!(config.upload_timeout, Duration::from_secs(60));
        assert_eq!(config.archive, ArchiveMode::Delete);
        assert!(config.is_ignored("clip.mp4.part"));
        assert!(!config.is_ignored("clip.mp4"));
    }

    #[test]
    fn validate_accepts_defaults_with_bucket() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(RelayConfig::default().validate().is_err());
        assert!(RelayConfig { retry_limit: 0, ..valid() }.validate().is_err());
        assert!(RelayConfig { max_concurrent_uploads: 0, ..valid() }.validate().is_err());
        assert!(RelayConfig { scan_interval: Duration::ZERO, ..valid() }.validate().is_err());
        assert!(RelayConfig { upload_timeout: Duration::ZERO, ..valid() }.validate().is_err());
    }

    #[test]
    fn archive_inside_source_is_skipped() {
        let config = RelayConfig {
            source_directory: PathBuf::from("/srv/ftp"),
            archive: ArchiveMode::Move { directory: PathBuf::from("/srv/ftp/.done") },
            ..valid()
        };
        assert_eq!(config.nested_archive_dir(), Some(PathBuf::from("/srv/ftp/.done")));

        let outside = RelayConfig {
            archive: ArchiveMode::Move { directory: PathBuf::from("/srv/archive") },
            ..config.clone()
        };
        assert_eq!(outside.nested_archive_dir(), None);

        let same = RelayConfig {
            archive: ArchiveMode::Move { directory: PathBuf::from("/srv/ftp") },
            ..config
        };
        assert!(same.validate().is_err());
    }
}
