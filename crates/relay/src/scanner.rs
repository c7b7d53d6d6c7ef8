use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Instant, SystemTime};

use camrelay_core::{CaptureFile, CaptureStatus};
use tracing::{debug, trace, warn};

use crate::config::RelayConfig;
use crate::ledger::{FileIdentity, Ledger, is_marker};
use crate::walk::DirWalker;

/// Size and modification time of a file as last seen by the scanner.
#[derive(Debug, Clone, Copy)]
struct Observation {
    size: u64,
    modified: SystemTime,
    since: Instant,
}

/// Finds capture files that have finished arriving.
///
/// A file is stable once a pass sees the same size and modification time
/// that an earlier pass recorded, and that observation is at least
/// `settle_time` old. Anything still being written is reconsidered on the
/// next pass.
#[derive(Debug)]
pub struct Scanner {
    config: RelayConfig,
    observations: HashMap<PathBuf, Observation>,
}

impl Scanner {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            config: config.clone(),
            observations: HashMap::new(),
        }
    }

    /// Start a pass over the source directory.
    ///
    /// The returned iterator walks the tree lazily and yields only stable
    /// files the ledger still considers pending. Observations of files that
    /// have disappeared are dropped once the iterator is exhausted.
    pub fn scan<'a>(&'a mut self, ledger: &'a Ledger) -> ScanPass<'a> {
        ScanPass {
            walker: DirWalker::new(&self.config.source_directory, self.config.nested_archive_dir()),
            scanner: self,
            ledger,
            seen: HashSet::new(),
            finished: false,
        }
    }

    /// Number of files currently being watched for stability.
    pub fn tracked(&self) -> usize {
        self.observations.len()
    }

    fn is_candidate_name(&self, file_name: &str) -> bool {
        !file_name.starts_with('.') && !is_marker(file_name) && !self.config.is_ignored(file_name)
    }
}

/// One lazy pass of a [`Scanner`].
pub struct ScanPass<'a> {
    walker: DirWalker,
    scanner: &'a mut Scanner,
    ledger: &'a Ledger,
    seen: HashSet<PathBuf>,
    finished: bool,
}

impl ScanPass<'_> {
    fn prune(&mut self) {
        let seen = &self.seen;
        let before = self.scanner.observations.len();
        self.scanner.observations.retain(|path, _| seen.contains(path));
        let pruned = before - self.scanner.observations.len();
        if pruned > 0 {
            debug!(pruned, "dropped observations of vanished files");
        }
    }
}

impl Iterator for ScanPass<'_> {
    type Item = CaptureFile;

    fn next(&mut self) -> Option<CaptureFile> {
        if self.finished {
            return None;
        }
        loop {
            let Some((path, meta)) = self.walker.next() else {
                self.finished = true;
                self.prune();
                return None;
            };

            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %path.display(), "skipping file with non UTF-8 name");
                continue;
            };
            if !self.scanner.is_candidate_name(file_name) || meta.len() == 0 {
                continue;
            }
            let modified = match meta.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot read modification time");
                    continue;
                }
            };
            let size = meta.len();
            if self.ledger.observe(&path, FileIdentity { size, modified }) != CaptureStatus::Pending {
                continue;
            }

            self.seen.insert(path.clone());
            let now = Instant::now();
            let settle_time = self.scanner.config.settle_time;

            let stable = match self.scanner.observations.get(&path) {
                Some(obs) if obs.size == size && obs.modified == modified => {
                    now.duration_since(obs.since) >= settle_time
                }
                _ => {
                    trace!(path = %path.display(), size, "file changed since last pass");
                    self.scanner.observations.insert(
                        path.clone(),
                        Observation {
                            size,
                            modified,
                            since: now,
                        },
                    );
                    false
                }
            };
            if !stable {
                continue;
            }

            match CaptureFile::from_entry(&self.scanner.config.source_directory, &path, size, modified) {
                Ok(capture) => return Some(capture),
                Err(e) => warn!(error = %e, "skipping unrecognised capture"),
            }
        }
    }
}
