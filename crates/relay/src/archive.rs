use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// What to do with a local file once storage has acknowledged it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveMode {
    /// Remove the file.
    Delete,
    /// Move the file below `directory`, keeping its path relative to the
    /// source directory.
    Move { directory: PathBuf },
}

/// Where a confirmed file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The file was removed.
    Deleted,
    /// The file was moved to the contained path.
    Archived(PathBuf),
    /// Removing or moving failed; the file is still at its source path and
    /// the step is retried on the next pass.
    Deferred,
}

/// Applies an [`ArchiveMode`] to confirmed files.
#[derive(Debug, Clone)]
pub struct Archiver {
    mode: ArchiveMode,
}

impl Archiver {
    pub fn new(mode: ArchiveMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> &ArchiveMode {
        &self.mode
    }

    /// Delete or move `path`. `relative` is its path below the source
    /// directory. A file that is already gone counts as done.
    pub async fn finalize(&self, path: &Path, relative: &Path) -> io::Result<Disposition> {
        match &self.mode {
            ArchiveMode::Delete => match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(Disposition::Deleted),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Disposition::Deleted),
                Err(e) => Err(e),
            },
            ArchiveMode::Move { directory } => {
                let dest = directory.join(relative);
                move_file(path, &dest).await?;
                Ok(Disposition::Archived(dest))
            }
        }
    }
}

async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound && !tokio::fs::try_exists(from).await? => {
            // Moved on an earlier pass whose bookkeeping was interrupted.
            Ok(())
        }
        Err(e) => {
            // Typically EXDEV when the archive is on another filesystem.
            debug!(from = %from.display(), to = %to.display(), error = %e, "rename failed, copying instead");
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}
