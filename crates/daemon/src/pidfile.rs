use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("PID file {} already exists; is another relay running?", .path.display())]
    AlreadyRunning { path: PathBuf },

    #[error("cannot write PID file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Holds the PID file for the lifetime of the process and removes it on
/// drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create `path` containing the current process ID. Fails if the file
    /// already exists.
    pub fn create(path: &Path) -> Result<Self, PidFileError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| {
                if source.kind() == io::ErrorKind::AlreadyExists {
                    PidFileError::AlreadyRunning {
                        path: path.to_path_buf(),
                    }
                } else {
                    PidFileError::Io {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            })?;
        writeln!(file, "{}", std::process::id()).map_err(|source| PidFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "PID file written");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "could not remove PID file");
        }
    }
}
