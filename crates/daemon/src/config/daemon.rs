use std::path::PathBuf;

use serde::Deserialize;

/// The `[daemon]` section: process supervision.
#[derive(Debug, Default, Deserialize)]
pub struct DaemonConfig {
    /// Write the process ID here while running. Startup fails if the file
    /// already exists.
    pub pid_file: Option<PathBuf>,
}
