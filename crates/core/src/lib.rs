//! Core types for the camrelay capture relay.
//!
//! A [`CaptureFile`] is a finished camera upload found on disk; an
//! [`UploadTarget`] is its deterministic destination in object storage.

pub mod capture;
pub mod error;
pub mod target;
pub mod types;

pub use capture::{CaptureFile, CaptureName, CaptureStatus};
pub use error::CaptureError;
pub use target::{UploadTarget, content_type_for, object_key};
pub use types::{CameraId, ObjectKey, UNKNOWN_CAMERA};
