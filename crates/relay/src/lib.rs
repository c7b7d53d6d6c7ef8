//! Scan-and-upload relay for camera captures.
//!
//! A [`Relay`] watches the directory an FTP server writes camera captures
//! into. Each pass it finds files that have stopped changing, uploads them
//! to object storage under a deterministic key, and deletes or archives the
//! local copy once storage confirms the write.
//!
//! Transient storage errors leave a file pending for the next pass, up to a
//! per-file retry limit, after which the file is flagged failed with a
//! marker on disk and left alone. Permanent errors (bad credentials, a
//! missing bucket) stop the relay.

pub mod archive;
pub mod config;
pub mod error;
pub mod ledger;
pub mod relay;
pub mod scanner;
pub mod watcher;

mod walk;

pub use archive::{ArchiveMode, Archiver, Disposition};
pub use config::{DEFAULT_IGNORE_SUFFIXES, RelayConfig};
pub use error::{LedgerError, RelayError, UploadError};
pub use ledger::{
    FailedEntry, FailureMarker, FileIdentity, FileRecord, Ledger, MARKER_SUFFIX, SETTLED_RETENTION,
};
pub use relay::{Confirmed, PassSummary, Relay, Uploader};
pub use scanner::{ScanPass, Scanner};
pub use watcher::SourceWatcher;
