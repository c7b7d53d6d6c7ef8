use std::path::PathBuf;

use camrelay_relay::DEFAULT_IGNORE_SUFFIXES;
use serde::Deserialize;

/// What to do with a local file after its upload is confirmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveModeName {
    /// Remove the file.
    #[default]
    Delete,
    /// Move the file below `archive_directory`.
    Move,
}

/// The `[relay]` section: where captures arrive and how they are handled.
///
/// # Example
///
/// ```toml
/// [relay]
/// source_directory = "/srv/ftp/cameras"
/// scan_interval_seconds = 10
/// retry_limit = 5
/// archive_mode = "move"
/// archive_directory = "/srv/ftp/archive"
/// ```
#[derive(Debug, Deserialize)]
pub struct RelaySection {
    /// Directory the FTP server writes captures into.
    #[serde(default)]
    pub source_directory: Option<PathBuf>,
    /// Seconds between scan passes.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_seconds: u64,
    /// Extra seconds a file must stay unchanged before upload.
    #[serde(default)]
    pub settle_seconds: u64,
    /// Transient failures allowed per file before it is flagged failed.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    /// Upper bound on a single upload in seconds.
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_seconds: u64,
    /// Uploads allowed to run at the same time.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_uploads: usize,
    #[serde(default)]
    pub archive_mode: ArchiveModeName,
    /// Required when `archive_mode = "move"`.
    #[serde(default)]
    pub archive_directory: Option<PathBuf>,
    /// File-name suffixes of partial transfers, never uploaded.
    #[serde(default = "default_ignore_suffixes")]
    pub ignore_suffixes: Vec<String>,
    /// Also wake on filesystem events instead of only on the timer.
    #[serde(default)]
    pub watch: bool,
    /// Quiet period after a filesystem event, in milliseconds.
    #[serde(default = "default_watch_debounce")]
    pub watch_debounce_ms: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            source_directory: None,
            scan_interval_seconds: default_scan_interval(),
            settle_seconds: 0,
            retry_limit: default_retry_limit(),
            upload_timeout_seconds: default_upload_timeout(),
            max_concurrent_uploads: default_max_concurrent(),
            archive_mode: ArchiveModeName::default(),
            archive_directory: None,
            ignore_suffixes: default_ignore_suffixes(),
            watch: false,
            watch_debounce_ms: default_watch_debounce(),
        }
    }
}

fn default_scan_interval() -> u64 {
    10
}

fn default_retry_limit() -> u32 {
    5
}

fn default_upload_timeout() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    1
}

fn default_ignore_suffixes() -> Vec<String> {
    DEFAULT_IGNORE_SUFFIXES
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn default_watch_debounce() -> u64 {
    500
}
