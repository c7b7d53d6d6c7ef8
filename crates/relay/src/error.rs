use std::path::PathBuf;

use camrelay_core::ObjectKey;
use camrelay_storage::StorageError;
use thiserror::Error;

/// Outcome classes of a single upload attempt that did not succeed.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The transfer failed in a way that may clear on a later pass.
    #[error("transient failure uploading {key} (attempt {attempt}): {source}")]
    TransientTransfer {
        key: ObjectKey,
        attempt: u32,
        #[source]
        source: StorageError,
    },

    /// The retry bound was reached; the file is marked failed and left in
    /// place.
    #[error("giving up on {key} after {attempts} attempts: {source}")]
    RetriesExhausted {
        key: ObjectKey,
        attempts: u32,
        #[source]
        source: StorageError,
    },

    /// Credentials or destination are wrong. Retrying cannot help.
    #[error("permanent storage failure for {key}: {source}")]
    PermanentConfig {
        key: ObjectKey,
        #[source]
        source: StorageError,
    },

    /// The local file could not be read or changed while being read.
    #[error("local I/O error on {}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// Short class name used in log fields.
    pub fn class(&self) -> &'static str {
        match self {
            Self::TransientTransfer { .. } => "transient_transfer",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::PermanentConfig { .. } => "permanent_config",
            Self::LocalIo { .. } => "local_io",
        }
    }

    /// Returns `true` if the relay loop must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::PermanentConfig { .. })
    }
}

/// Errors reading or writing failure markers.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("marker I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed marker {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that stop the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Permanent(#[from] UploadError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("filesystem watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("source scan failed: {0}")]
    Scan(String),

    #[error("invalid relay configuration: {0}")]
    Configuration(String),
}
