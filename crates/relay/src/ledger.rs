//! Per-file upload state.
//!
//! The ledger is the single source of truth for how far each capture has
//! progressed. It lives in memory; the only durable part is a small JSON
//! marker written next to a file once it exhausts its retries, so failed
//! files stay failed across restarts without any database.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use camrelay_core::{CaptureFile, CaptureStatus, ObjectKey};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::archive::Disposition;
use crate::error::LedgerError;
use crate::walk::DirWalker;

/// Suffix appended to a file name to form its failure marker.
pub const MARKER_SUFFIX: &str = ".camrelay-failed";

/// How long a capture whose local step completed is remembered, so a
/// repeated `upload` of it stays a no-op.
pub const SETTLED_RETENTION: Duration = Duration::from_secs(3600);

/// Size and modification time that tell one version of a file from a
/// later file written to the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    pub size: u64,
    pub modified: SystemTime,
}

impl FileIdentity {
    pub fn of(capture: &CaptureFile) -> Self {
        Self {
            size: capture.size,
            modified: capture.modified,
        }
    }
}

/// A confirmed capture whose delete or move has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub disposition: Disposition,
    pub at: Instant,
}

/// In-memory state for one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub status: CaptureStatus,
    /// Transient transfer failures so far.
    pub attempts: u32,
    pub key: Option<ObjectKey>,
    pub last_error: Option<String>,
    /// Version of the file the attempts were made against.
    pub identity: Option<FileIdentity>,
    /// The failure marker is on disk. Only then may a missing marker be read
    /// as an operator clearing it.
    pub marker_written: bool,
    /// Set once the local step of a confirmed capture is done.
    pub settled: Option<Settled>,
}

impl Default for FileRecord {
    fn default() -> Self {
        Self {
            status: CaptureStatus::Pending,
            attempts: 0,
            key: None,
            last_error: None,
            identity: None,
            marker_written: false,
            settled: None,
        }
    }
}

impl FileRecord {
    /// A different file now sits at this record's path, and the record
    /// describes nothing an operator still has to act on.
    fn is_replaced_by(&self, identity: FileIdentity) -> bool {
        let forgettable = self.settled.is_some() || self.status == CaptureStatus::Pending;
        forgettable && self.identity.is_some_and(|seen| seen != identity)
    }
}

/// Contents of a `<file>.camrelay-failed` marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureMarker {
    pub attempts: u32,
    pub key: Option<ObjectKey>,
    pub last_error: Option<String>,
    pub failed_at: DateTime<Utc>,
}

/// A file flagged failed, as listed for operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEntry {
    pub path: PathBuf,
    pub attempts: u32,
    pub key: Option<ObjectKey>,
    pub last_error: Option<String>,
}

/// Concurrent map from capture path to its [`FileRecord`].
#[derive(Debug, Default)]
pub struct Ledger {
    records: DashMap<PathBuf, FileRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from the failure markers found below `root`.
    ///
    /// Markers whose capture file no longer exists are ignored. Unreadable or
    /// malformed markers are logged and skipped.
    pub fn rebuild(root: &Path) -> Self {
        let ledger = Self::new();
        for (path, _) in DirWalker::new(root, None) {
            let Some(capture) = capture_for_marker(&path) else {
                continue;
            };
            if !capture.exists() {
                warn!(marker = %path.display(), "failure marker without capture file");
                continue;
            }
            match read_marker(&path) {
                Ok(marker) => {
                    ledger.records.insert(
                        capture,
                        FileRecord {
                            status: CaptureStatus::Failed,
                            attempts: marker.attempts,
                            key: marker.key,
                            last_error: marker.last_error,
                            marker_written: true,
                            ..FileRecord::default()
                        },
                    );
                }
                Err(e) => warn!(error = %e, "skipping unreadable failure marker"),
            }
        }
        let failed = ledger.records.len();
        if failed > 0 {
            info!(failed, "restored failed captures from markers");
        }
        ledger
    }

    /// Current status of `path`. Unknown files are pending.
    pub fn status(&self, path: &Path) -> CaptureStatus {
        self.records
            .get(path)
            .map_or(CaptureStatus::Pending, |r| r.status)
    }

    /// Status of the version of `path` described by `identity`.
    ///
    /// When a different file has replaced a settled capture, or a pending
    /// one with earlier failures, the old record is dropped and the new file
    /// starts out pending with no attempts.
    pub fn observe(&self, path: &Path, identity: FileIdentity) -> CaptureStatus {
        if self
            .records
            .remove_if(path, |_, record| record.is_replaced_by(identity))
            .is_some()
        {
            debug!(path = %path.display(), "new file at a known path, starting over");
            return CaptureStatus::Pending;
        }
        self.status(path)
    }

    /// Snapshot of the record for `path`.
    pub fn record(&self, path: &Path) -> Option<FileRecord> {
        self.records.get(path).map(|r| r.clone())
    }

    /// Where a settled capture ended up.
    pub fn settled(&self, path: &Path) -> Option<Disposition> {
        self.records
            .get(path)
            .and_then(|r| r.settled.as_ref().map(|s| s.disposition.clone()))
    }

    /// Mark `path` in flight and return the number of this attempt.
    pub fn begin(&self, path: &Path, key: &ObjectKey, identity: FileIdentity) -> u32 {
        let mut record = self.records.entry(path.to_path_buf()).or_default();
        record.status = CaptureStatus::InFlight;
        record.key = Some(key.clone());
        record.identity = Some(identity);
        record.settled = None;
        record.attempts + 1
    }

    /// Storage acknowledged the write.
    pub fn confirm(&self, path: &Path) {
        let mut record = self.records.entry(path.to_path_buf()).or_default();
        record.status = CaptureStatus::Confirmed;
        record.last_error = None;
    }

    /// Count a transient transfer failure and return the total so far. The
    /// file goes back to pending.
    pub fn record_failure(&self, path: &Path, error: &str) -> u32 {
        let mut record = self.records.entry(path.to_path_buf()).or_default();
        record.status = CaptureStatus::Pending;
        record.attempts += 1;
        record.last_error = Some(error.to_owned());
        record.attempts
    }

    /// Return an in-flight file to pending without counting an attempt.
    pub fn release(&self, path: &Path) {
        if let Some(mut record) = self.records.get_mut(path) {
            if record.status == CaptureStatus::InFlight {
                record.status = CaptureStatus::Pending;
            }
        }
    }

    /// Return every in-flight file to pending, after a pass was interrupted.
    pub fn release_in_flight(&self) {
        for mut record in self.records.iter_mut() {
            if record.status == CaptureStatus::InFlight {
                record.status = CaptureStatus::Pending;
            }
        }
    }

    /// The local delete or move of a confirmed capture completed.
    pub fn settle(&self, path: &Path, disposition: Disposition) {
        let mut record = self.records.entry(path.to_path_buf()).or_default();
        record.status = CaptureStatus::Confirmed;
        record.settled = Some(Settled {
            disposition,
            at: Instant::now(),
        });
    }

    /// Flag `path` failed and write its marker.
    ///
    /// The file stays failed in memory even when the marker cannot be
    /// written; it is then only retried after a restart.
    pub async fn mark_failed(&self, path: &Path) -> Result<(), LedgerError> {
        let marker = {
            let mut record = self.records.entry(path.to_path_buf()).or_default();
            record.status = CaptureStatus::Failed;
            record.marker_written = false;
            FailureMarker {
                attempts: record.attempts,
                key: record.key.clone(),
                last_error: record.last_error.clone(),
                failed_at: Utc::now(),
            }
        };

        let marker_path = marker_path(path);
        let json = serde_json::to_vec_pretty(&marker).map_err(|source| LedgerError::Json {
            path: marker_path.clone(),
            source,
        })?;
        tokio::fs::write(&marker_path, json)
            .await
            .map_err(|source| LedgerError::Io {
                path: marker_path,
                source,
            })?;
        if let Some(mut record) = self.records.get_mut(path) {
            record.marker_written = true;
        }
        Ok(())
    }

    /// Drop all state for `path`.
    pub fn forget(&self, path: &Path) {
        self.records.remove(path);
    }

    /// Files confirmed in storage that are still awaiting their local delete
    /// or move.
    pub fn confirmed_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .records
            .iter()
            .filter(|r| r.status == CaptureStatus::Confirmed && r.settled.is_none())
            .map(|r| r.key().clone())
            .collect();
        paths.sort();
        paths
    }

    /// Failed files, sorted by path.
    pub fn failed_entries(&self) -> Vec<FailedEntry> {
        let mut entries: Vec<FailedEntry> = self
            .records
            .iter()
            .filter(|r| r.status == CaptureStatus::Failed)
            .map(|r| {
                let record = r.value();
                FailedEntry {
                    path: r.key().clone(),
                    attempts: record.attempts,
                    key: record.key.clone(),
                    last_error: record.last_error.clone(),
                }
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Remove the markers of every failed file and forget them, so they are
    /// picked up again by the next scan. Returns the files that were reset.
    pub async fn reset_failed(&self) -> Result<Vec<PathBuf>, LedgerError> {
        let failed = self.paths_with(CaptureStatus::Failed);
        for path in &failed {
            let marker_path = marker_path(path);
            match tokio::fs::remove_file(&marker_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(LedgerError::Io {
                        path: marker_path,
                        source,
                    });
                }
            }
            self.records.remove(path);
            info!(path = %path.display(), "failure marker cleared");
        }
        Ok(failed)
    }

    /// Forget failed files whose marker has been removed by someone else
    /// (typically `camrelay retry`). Returns how many were forgotten.
    ///
    /// Files whose marker was never written are kept failed.
    pub fn forget_cleared(&self) -> usize {
        let cleared: Vec<PathBuf> = self
            .records
            .iter()
            .filter(|r| r.status == CaptureStatus::Failed && r.marker_written)
            .map(|r| r.key().clone())
            .filter(|path| !marker_path(path).exists())
            .collect();
        for path in &cleared {
            self.records.remove(path);
        }
        cleared.len()
    }

    /// Drop records that no longer describe a file on disk: pending and
    /// failed files that have disappeared, and settled captures older than
    /// `retention`. In-flight files and confirmed files still awaiting their
    /// local step are kept. Returns how many records were dropped.
    ///
    /// Checks the filesystem, so callers on the runtime should run it on a
    /// blocking thread.
    pub fn prune(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|path, record| match (&record.settled, record.status) {
            (Some(settled), _) => now.duration_since(settled.at) < retention,
            (None, CaptureStatus::Pending | CaptureStatus::Failed) => path.exists(),
            (None, CaptureStatus::InFlight | CaptureStatus::Confirmed) => true,
        });
        before.saturating_sub(self.records.len())
    }

    /// Number of tracked files.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn paths_with(&self, status: CaptureStatus) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .records
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.key().clone())
            .collect();
        paths.sort();
        paths
    }
}

/// `<file>.camrelay-failed` next to `path`.
pub fn marker_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(MARKER_SUFFIX);
    path.with_file_name(name)
}

/// Returns `true` if `file_name` is a failure marker.
pub fn is_marker(file_name: &str) -> bool {
    file_name.ends_with(MARKER_SUFFIX)
}

fn capture_for_marker(marker: &Path) -> Option<PathBuf> {
    let name = marker.file_name()?.to_str()?;
    let capture = name.strip_suffix(MARKER_SUFFIX)?;
    if capture.is_empty() {
        return None;
    }
    Some(marker.with_file_name(capture))
}

fn read_marker(path: &Path) -> Result<FailureMarker, LedgerError> {
    let bytes = std::fs::read(path).map_err(|source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| LedgerError::Json {
        path: path.to_path_buf(),
        source,
    })
}
