use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use camrelay_core::target::META_SHA256;
use camrelay_core::{CaptureFile, CaptureStatus, ObjectKey, UploadTarget};
use camrelay_storage::{DynObjectStore, StorageError};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::archive::{Archiver, Disposition};
use crate::config::RelayConfig;
use crate::error::{RelayError, UploadError};
use crate::ledger::{FileIdentity, Ledger, SETTLED_RETENTION};
use crate::scanner::Scanner;
use crate::watcher::{SourceWatcher, wait_for_change};

/// A capture that storage has acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmed {
    pub key: ObjectKey,
    /// `true` when the write had already been confirmed by an earlier call
    /// and only the local delete or move was (re)tried.
    pub already_confirmed: bool,
    pub disposition: Disposition,
}

/// Counts of what happened during one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub uploaded: usize,
    pub already_confirmed: usize,
    pub retrying: usize,
    pub failed: usize,
    pub local_errors: usize,
    /// Confirmed files whose local delete or move is still outstanding.
    pub deferred: usize,
}

impl PassSummary {
    /// Returns `true` if the pass touched no files at all.
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    /// Add the counts of `other` to these.
    pub fn merge(&mut self, other: PassSummary) {
        self.uploaded += other.uploaded;
        self.already_confirmed += other.already_confirmed;
        self.retrying += other.retrying;
        self.failed += other.failed;
        self.local_errors += other.local_errors;
        self.deferred += other.deferred;
    }
}

/// Transfers single captures and applies the archive step.
///
/// Holds everything an upload needs so that several uploads can run
/// concurrently against one shared ledger.
pub struct Uploader {
    store: Arc<dyn DynObjectStore>,
    ledger: Arc<Ledger>,
    archiver: Archiver,
    bucket: String,
    key_prefix: Option<String>,
    retry_limit: u32,
    upload_timeout: Duration,
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("store", &self.store.name())
            .field("archiver", &self.archiver)
            .field("bucket", &self.bucket)
            .field("key_prefix", &self.key_prefix)
            .field("retry_limit", &self.retry_limit)
            .field("upload_timeout", &self.upload_timeout)
            .finish_non_exhaustive()
    }
}

impl Uploader {
    pub fn new(config: &RelayConfig, store: Arc<dyn DynObjectStore>, ledger: Arc<Ledger>) -> Self {
        Self {
            store,
            ledger,
            archiver: Archiver::new(config.archive.clone()),
            bucket: config.bucket.clone(),
            key_prefix: config.key_prefix.clone(),
            retry_limit: config.retry_limit,
            upload_timeout: config.upload_timeout,
        }
    }

    /// Upload one capture and, once storage confirms it, delete or archive
    /// the local file.
    ///
    /// Performs at most one storage write. A capture the ledger already
    /// holds as confirmed is not written again; only its local step is
    /// retried, and once that step is done a repeated call returns where the
    /// file ended up.
    #[instrument(skip(self, capture), fields(path = %capture.path.display(), camera = %capture.camera))]
    pub async fn upload(&self, capture: &CaptureFile) -> Result<Confirmed, UploadError> {
        let target = UploadTarget::for_capture(&self.bucket, self.key_prefix.as_deref(), capture);
        let key = target.key.clone();
        let identity = FileIdentity::of(capture);

        if self.ledger.observe(&capture.path, identity) == CaptureStatus::Confirmed {
            let disposition = match self.ledger.settled(&capture.path) {
                Some(disposition) => {
                    debug!(key = %key, "already confirmed and finalized");
                    disposition
                }
                None => {
                    debug!(key = %key, "already confirmed, retrying local step only");
                    self.finalize(&capture.path, &capture.relative_path, &key).await
                }
            };
            return Ok(Confirmed {
                key,
                already_confirmed: true,
                disposition,
            });
        }

        let attempt = self.ledger.begin(&capture.path, &key, identity);
        let body = match self.read_capture(capture).await {
            Ok(body) => body,
            Err(e) => {
                self.ledger.release(&capture.path);
                warn!(key = %key, error = %e, error_class = e.class(), "skipping capture for this pass");
                return Err(e);
            }
        };
        let target = target.with_metadata(META_SHA256, hex::encode(Sha256::digest(&body)));

        debug!(key = %key, attempt, size = body.len(), "uploading capture");
        let result = match tokio::time::timeout(
            self.upload_timeout,
            self.store.put_object(&target, body),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(format!(
                "upload exceeded {}s",
                self.upload_timeout.as_secs()
            ))),
        };

        match result {
            Ok(()) => {
                self.ledger.confirm(&capture.path);
                info!(key = %key, bucket = %self.bucket, attempt, "capture uploaded");
                let disposition = self.finalize(&capture.path, &capture.relative_path, &key).await;
                Ok(Confirmed {
                    key,
                    already_confirmed: false,
                    disposition,
                })
            }
            Err(source) if source.is_permanent() => {
                self.ledger.release(&capture.path);
                error!(
                    key = %key,
                    error = %source,
                    error_class = source.class(),
                    "permanent storage error"
                );
                Err(UploadError::PermanentConfig { key, source })
            }
            Err(source) => self.record_transient(&capture.path, key, source).await,
        }
    }

    /// Run the local delete or move for a confirmed file. Failures are
    /// logged and leave the ledger entry confirmed for a later retry.
    pub async fn finalize(&self, path: &Path, relative: &Path, key: &ObjectKey) -> Disposition {
        match self.archiver.finalize(path, relative).await {
            Ok(disposition) => {
                self.ledger.settle(path, disposition.clone());
                match &disposition {
                    Disposition::Archived(dest) => {
                        debug!(key = %key, archived_to = %dest.display(), "local file archived");
                    }
                    _ => debug!(key = %key, "local file removed"),
                }
                disposition
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    key = %key,
                    error = %e,
                    "upload confirmed but local file could not be removed, will retry"
                );
                Disposition::Deferred
            }
        }
    }

    async fn read_capture(&self, capture: &CaptureFile) -> Result<Bytes, UploadError> {
        let body = tokio::fs::read(&capture.path)
            .await
            .map_err(|source| UploadError::LocalIo {
                path: capture.path.clone(),
                source,
            })?;
        if body.len() as u64 != capture.size {
            return Err(UploadError::LocalIo {
                path: capture.path.clone(),
                source: std::io::Error::other(format!(
                    "file changed from {} to {} bytes since it was found stable",
                    capture.size,
                    body.len()
                )),
            });
        }
        Ok(Bytes::from(body))
    }

    async fn record_transient(
        &self,
        path: &Path,
        key: ObjectKey,
        source: StorageError,
    ) -> Result<Confirmed, UploadError> {
        let attempts = self.ledger.record_failure(path, &source.to_string());
        if attempts < self.retry_limit {
            warn!(
                key = %key,
                attempt = attempts,
                retry_limit = self.retry_limit,
                error = %source,
                error_class = source.class(),
                "upload failed, will retry next pass"
            );
            return Err(UploadError::TransientTransfer {
                key,
                attempt: attempts,
                source,
            });
        }

        if let Err(e) = self.ledger.mark_failed(path).await {
            error!(key = %key, error = %e, "could not write failure marker");
        }
        error!(
            key = %key,
            attempts,
            error = %source,
            error_class = source.class(),
            "retry limit reached, leaving file in place"
        );
        Err(UploadError::RetriesExhausted {
            key,
            attempts,
            source,
        })
    }
}

/// Periodic scan-and-upload loop over one source directory.
#[derive(Debug)]
pub struct Relay {
    config: RelayConfig,
    scanner: Scanner,
    ledger: Arc<Ledger>,
    uploader: Uploader,
}

impl Relay {
    /// Validate `config` and restore failed files from their markers.
    pub fn new(config: RelayConfig, store: Arc<dyn DynObjectStore>) -> Result<Self, RelayError> {
        config.validate()?;
        let ledger = Arc::new(Ledger::rebuild(&config.source_directory));
        let uploader = Uploader::new(&config, store, Arc::clone(&ledger));
        Ok(Self {
            scanner: Scanner::new(&config),
            config,
            ledger,
            uploader,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Upload a single capture. See [`Uploader::upload`].
    pub async fn upload(&self, capture: &CaptureFile) -> Result<Confirmed, UploadError> {
        self.uploader.upload(capture).await
    }

    /// Run one pass: retry outstanding local steps, then upload every stable
    /// capture with at most `max_concurrent_uploads` transfers in flight.
    ///
    /// Transient and local errors are absorbed into the summary. A permanent
    /// storage error ends the pass with [`RelayError::Permanent`].
    pub async fn run_pass(&mut self) -> Result<PassSummary, RelayError> {
        let mut summary = PassSummary::default();

        for path in self.ledger.confirmed_paths() {
            let relative = relative_to(&self.config.source_directory, &path);
            let key = self
                .ledger
                .record(&path)
                .and_then(|r| r.key)
                .unwrap_or_else(|| ObjectKey::new(relative.to_string_lossy()));
            if self.uploader.finalize(&path, &relative, &key).await == Disposition::Deferred {
                summary.deferred += 1;
            }
        }

        let captures = self.collect_stable().await?;
        let uploader = &self.uploader;
        let mut uploads = futures::stream::iter(captures)
            .map(|capture| async move { uploader.upload(&capture).await })
            .buffer_unordered(self.config.max_concurrent_uploads);

        let mut fatal = None;
        while let Some(result) = uploads.next().await {
            match result {
                Ok(confirmed) => {
                    if confirmed.already_confirmed {
                        summary.already_confirmed += 1;
                    } else {
                        summary.uploaded += 1;
                    }
                    if confirmed.disposition == Disposition::Deferred {
                        summary.deferred += 1;
                    }
                }
                Err(UploadError::TransientTransfer { .. }) => summary.retrying += 1,
                Err(UploadError::RetriesExhausted { .. }) => summary.failed += 1,
                Err(UploadError::LocalIo { .. }) => summary.local_errors += 1,
                Err(e @ UploadError::PermanentConfig { .. }) => {
                    fatal = Some(e);
                    break;
                }
            }
        }
        drop(uploads);

        if let Some(e) = fatal {
            self.ledger.release_in_flight();
            return Err(RelayError::Permanent(e));
        }
        Ok(summary)
    }

    /// Walk the source tree on a blocking thread and return the captures
    /// ready for upload. Ledger housekeeping that touches the filesystem
    /// runs there too.
    async fn collect_stable(&mut self) -> Result<Vec<CaptureFile>, RelayError> {
        let mut scanner = std::mem::replace(&mut self.scanner, Scanner::new(&self.config));
        let ledger = Arc::clone(&self.ledger);
        let (scanner, captures) = tokio::task::spawn_blocking(move || {
            let cleared = ledger.forget_cleared();
            if cleared > 0 {
                info!(cleared, "failure markers removed externally, retrying those files");
            }
            let pruned = ledger.prune(SETTLED_RETENTION);
            if pruned > 0 {
                debug!(pruned, "dropped ledger records of files no longer present");
            }
            let captures: Vec<CaptureFile> = scanner.scan(&ledger).collect();
            (scanner, captures)
        })
        .await
        .map_err(|e| RelayError::Scan(format!("task join error: {e}")))?;
        self.scanner = scanner;
        Ok(captures)
    }

    /// Upload everything that is already complete, then return.
    ///
    /// Stability needs two sightings, so this runs an observation pass,
    /// waits `settle_time` (at least one second) and runs a second pass.
    /// Files that changed in between are left for a later run.
    pub async fn run_once(&mut self) -> Result<PassSummary, RelayError> {
        let mut summary = self.run_pass().await?;
        tokio::time::sleep(self.config.settle_time.max(Duration::from_secs(1))).await;
        summary.merge(self.run_pass().await?);
        Ok(summary)
    }

    /// Repeat passes every `scan_interval` (or sooner on filesystem events
    /// when watching) until `shutdown` is cancelled or a permanent error
    /// occurs.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), RelayError> {
        let mut watcher = if self.config.watch {
            Some(SourceWatcher::start(
                &self.config.source_directory,
                self.config.watch_debounce,
            )?)
        } else {
            None
        };

        let mut ticker = interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            source = %self.config.source_directory.display(),
            bucket = %self.config.bucket,
            scan_interval_secs = self.config.scan_interval.as_secs(),
            watch = self.config.watch,
            "relay starting"
        );

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("relay received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {}
                () = wait_for_change(&mut watcher) => {
                    debug!("pass triggered by filesystem change");
                }
            }

            let outcome = tokio::select! {
                () = shutdown.cancelled() => None,
                result = self.run_pass() => Some(result),
            };
            let Some(result) = outcome else {
                self.ledger.release_in_flight();
                info!("relay received shutdown signal during pass");
                break;
            };

            let summary = result?;
            if summary.is_idle() {
                debug!(tracked = self.scanner.tracked(), "pass complete, nothing to do");
            } else {
                info!(
                    uploaded = summary.uploaded,
                    already_confirmed = summary.already_confirmed,
                    retrying = summary.retrying,
                    failed = summary.failed,
                    local_errors = summary.local_errors,
                    deferred = summary.deferred,
                    "pass complete"
                );
            }
        }

        info!("relay stopped");
        Ok(())
    }
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
