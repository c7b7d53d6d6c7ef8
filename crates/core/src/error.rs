use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning a directory entry into a capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The path is not below the configured source directory.
    #[error("{} is outside the source directory", .0.display())]
    OutsideRoot(PathBuf),

    /// The file name is missing or not valid UTF-8.
    #[error("{} has no usable file name", .0.display())]
    InvalidName(PathBuf),
}
