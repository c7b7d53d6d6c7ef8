use std::collections::BTreeMap;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::capture::CaptureFile;
use crate::types::ObjectKey;

/// Metadata key naming the camera.
pub const META_CAMERA: &str = "camera";
/// Metadata key holding the RFC 3339 capture time.
pub const META_CAPTURED_AT: &str = "captured-at";
/// Metadata key holding the original file name.
pub const META_SOURCE_NAME: &str = "source-name";
/// Metadata key holding the byte size.
pub const META_SIZE: &str = "size";
/// Metadata key holding the hex SHA-256 of the uploaded bytes.
pub const META_SHA256: &str = "sha256";

/// Destination of a capture in object storage.
///
/// Computed from a [`CaptureFile`]; identical inputs always produce the same
/// key so a retried upload overwrites rather than duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    /// Bucket name.
    pub bucket: String,
    /// Object key within the bucket.
    pub key: ObjectKey,
    /// `Content-Type` for the object.
    pub content_type: String,
    /// User metadata attached to the object.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl UploadTarget {
    /// Project a capture onto its destination in `bucket`.
    pub fn for_capture(bucket: impl Into<String>, prefix: Option<&str>, capture: &CaptureFile) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_CAMERA.to_owned(), capture.camera.to_string());
        metadata.insert(
            META_CAPTURED_AT.to_owned(),
            capture.captured_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        metadata.insert(META_SOURCE_NAME.to_owned(), capture.file_name().to_owned());
        metadata.insert(META_SIZE.to_owned(), capture.size.to_string());

        Self {
            bucket: bucket.into(),
            key: object_key(prefix, capture),
            content_type: content_type_for(capture.extension().as_deref()).to_owned(),
            metadata,
        }
    }

    /// Attach an extra metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// `[prefix/]<camera>/<YYYY>/<MM>/<DD>/<object name>`, where the object name
/// may carry the sub-directories of an unconventionally named capture.
pub fn object_key(prefix: Option<&str>, capture: &CaptureFile) -> ObjectKey {
    let day = capture.captured_at.format("%Y/%m/%d");
    let body = format!("{}/{day}/{}", capture.camera, capture.object_name);
    match prefix.map(|p| p.trim_start_matches('/')).filter(|p| !p.is_empty()) {
        Some(p) if p.ends_with('/') => ObjectKey::new(format!("{p}{body}")),
        Some(p) => ObjectKey::new(format!("{p}/{body}")),
        None => ObjectKey::new(body),
    }
}

/// Content type for a lower-cased file extension.
pub fn content_type_for(extension: Option<&str>) -> &'static str {
    match extension {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("h264") => "video/h264",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::SystemTime;

    use super::*;

    fn capture(rel: &str, size: u64) -> CaptureFile {
        let root = Path::new("/srv/ftp");
        CaptureFile::from_entry(root, &root.join(rel), size, SystemTime::UNIX_EPOCH).unwrap()
    }

    #[test]
    fn key_for_conventional_name() {
        let target = UploadTarget::for_capture("bucket", None, &capture("cam1_20240101_120000.jpg", 512_000));
        assert_eq!(target.bucket, "bucket");
        assert_eq!(target.key.as_str(), "cam1/2024/01/01/120000.jpg");
        assert_eq!(target.content_type, "image/jpeg");
        assert_eq!(target.metadata.get(META_CAMERA).unwrap(), "cam1");
        assert_eq!(target.metadata.get(META_SIZE).unwrap(), "512000");
        assert_eq!(
            target.metadata.get(META_CAPTURED_AT).unwrap(),
            "2024-01-01T12:00:00Z"
        );
    }

    #[test]
    fn prefix_gets_separator() {
        let c = capture("cam1_20240101_120000.jpg", 1);
        assert_eq!(
            object_key(Some("captures"), &c).as_str(),
            "captures/cam1/2024/01/01/120000.jpg"
        );
        assert_eq!(
            object_key(Some("captures/"), &c).as_str(),
            "captures/cam1/2024/01/01/120000.jpg"
        );
        assert_eq!(object_key(Some(""), &c).as_str(), "cam1/2024/01/01/120000.jpg");
    }

    #[test]
    fn key_is_deterministic() {
        let a = UploadTarget::for_capture("b", Some("x/"), &capture("yard/clip.mkv", 5));
        let b = UploadTarget::for_capture("b", Some("x/"), &capture("yard/clip.mkv", 5));
        assert_eq!(a, b);
        assert_eq!(a.key.as_str(), "x/yard/1970/01/01/clip.mkv");
        assert_eq!(a.content_type, "video/x-matroska");
    }

    #[test]
    fn nested_directories_stay_in_key() {
        let snap = object_key(None, &capture("garage/snap/MDAlarm.jpg", 1));
        let record = object_key(None, &capture("garage/record/MDAlarm.jpg", 1));
        assert_eq!(snap.as_str(), "garage/1970/01/01/snap/MDAlarm.jpg");
        assert_eq!(record.as_str(), "garage/1970/01/01/record/MDAlarm.jpg");
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(content_type_for(Some("dat")), "application/octet-stream");
        assert_eq!(content_type_for(None), "application/octet-stream");
    }

    #[test]
    fn with_metadata_adds_entry() {
        let target = UploadTarget::for_capture("b", None, &capture("cam1_20240101_120000.jpg", 1))
            .with_metadata(META_SHA256, "abc");
        assert_eq!(target.metadata.get(META_SHA256).unwrap(), "abc");
    }
}
