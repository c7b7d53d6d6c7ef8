use std::path::Path;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::RelayError;

/// Filesystem watch that nudges the relay loop when captures arrive.
///
/// Events only wake the loop early; stability is still decided by the
/// scanner, so a missed or coalesced event costs at most one scan interval.
pub struct SourceWatcher {
    // Dropping the watcher stops event delivery.
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
    debounce: Duration,
}

impl SourceWatcher {
    /// Watch `root` recursively.
    pub fn start(root: &Path, debounce: Duration) -> Result<Self, RelayError> {
        let (tx, rx) = mpsc::channel::<()>(16);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if is_relevant_event(event.kind) {
                        // A full channel already has a wake-up queued.
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        info!(path = %root.display(), "watching source directory");
        Ok(Self {
            _watcher: watcher,
            rx,
            debounce,
        })
    }

    /// Wait for the next burst of events, then for the debounce window to
    /// pass quietly. Returns `false` once the watcher has shut down.
    pub async fn changed(&mut self) -> bool {
        if self.rx.recv().await.is_none() {
            return false;
        }
        tokio::time::sleep(self.debounce).await;
        let mut drained = 0usize;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        debug!(drained, "filesystem change detected");
        true
    }
}

/// Wait for a change on `watcher`, or forever when there is none.
pub(crate) async fn wait_for_change(watcher: &mut Option<SourceWatcher>) {
    if let Some(w) = watcher {
        if w.changed().await {
            return;
        }
        warn!("filesystem watcher stopped, falling back to interval scans");
        *watcher = None;
    }
    std::future::pending::<()>().await;
}

fn is_relevant_event(kind: EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}
