use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CaptureError;
use crate::types::{CameraId, UNKNOWN_CAMERA};

/// `<camera>_<YYYYMMDD>_<HHMMSS><suffix>.<ext>`. The camera group is lazy so
/// camera names may themselves contain underscores.
static CAPTURE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<camera>.+?)_(?P<date>\d{8})_(?P<time>\d{6})(?P<suffix>[^.]*)\.(?P<ext>.+)$")
        .expect("capture name pattern is valid")
});

/// Upload lifecycle of a capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    /// Waiting for (another) upload attempt.
    Pending,
    /// A transfer is currently running.
    InFlight,
    /// Storage acknowledged the write.
    Confirmed,
    /// The retry bound was exhausted; the file is left for an operator.
    Failed,
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Fields recovered from a file name that follows the camera naming
/// convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureName {
    /// Camera identifier (the name prefix).
    pub camera: CameraId,
    /// Capture time encoded in the name.
    pub captured_at: NaiveDateTime,
    /// Object name within the day directory, e.g. `120000.jpg`.
    pub object_name: String,
}

impl CaptureName {
    /// Parse `cam1_20240101_120000.jpg` style names.
    ///
    /// Returns `None` when the name does not follow the convention or the
    /// encoded date/time is not a real calendar value.
    pub fn parse(file_name: &str) -> Option<Self> {
        let caps = CAPTURE_NAME.captures(file_name)?;
        let date = NaiveDate::parse_from_str(&caps["date"], "%Y%m%d").ok()?;
        let time = NaiveTime::parse_from_str(&caps["time"], "%H%M%S").ok()?;
        Some(Self {
            camera: CameraId::new(&caps["camera"]),
            captured_at: date.and_time(time),
            object_name: format!("{}{}.{}", &caps["time"], &caps["suffix"], &caps["ext"]),
        })
    }
}

/// A file produced by a camera via FTP, awaiting relay to object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFile {
    /// Absolute (or root-joined) path on disk.
    pub path: PathBuf,
    /// Path relative to the watched source directory.
    pub relative_path: PathBuf,
    /// Camera that produced the file.
    pub camera: CameraId,
    /// Capture timestamp, from the file name or else the modification time.
    pub captured_at: DateTime<Utc>,
    /// Part of the object key below the day directory. For names that
    /// follow the convention this is a single segment; otherwise it keeps
    /// the directories between the camera directory and the file.
    pub object_name: String,
    /// Size in bytes when the file was found stable.
    pub size: u64,
    /// Modification time when the file was found stable.
    pub modified: SystemTime,
    /// Current upload status.
    pub status: CaptureStatus,
}

impl CaptureFile {
    /// Build a capture from a directory entry found below `root`.
    ///
    /// Camera identity comes from the file name when it follows the
    /// `<camera>_<YYYYMMDD>_<HHMMSS>` convention. Otherwise the first
    /// directory below `root` names the camera (or [`UNKNOWN_CAMERA`] for
    /// files directly in `root`), the modification time dates the capture
    /// and any deeper directories stay part of the object name, so
    /// `garage/snap/a.jpg` and `garage/record/a.jpg` never share a key.
    pub fn from_entry(
        root: &Path,
        path: &Path,
        size: u64,
        modified: SystemTime,
    ) -> Result<Self, CaptureError> {
        let relative_path = path
            .strip_prefix(root)
            .map_err(|_| CaptureError::OutsideRoot(path.to_path_buf()))?
            .to_path_buf();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CaptureError::InvalidName(path.to_path_buf()))?;

        let (camera, captured_at, object_name) = match CaptureName::parse(file_name) {
            Some(name) => (name.camera, name.captured_at.and_utc(), name.object_name),
            None => {
                let (camera, object_name) = split_camera_directory(&relative_path, file_name);
                (camera, DateTime::<Utc>::from(modified), object_name)
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            relative_path,
            camera,
            captured_at,
            object_name,
            size,
            modified,
            status: CaptureStatus::Pending,
        })
    }

    /// The on-disk file name.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Lower-cased extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }
}

/// Split `<camera>/<subdirs...>/<file>` into the camera and the
/// `<subdirs...>/<file>` object name.
fn split_camera_directory(relative_path: &Path, file_name: &str) -> (CameraId, String) {
    let dirs: Vec<String> = relative_path
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .filter_map(|c| match c {
            Component::Normal(dir) => Some(dir.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    match dirs.split_first() {
        Some((camera, rest)) => {
            let mut object_name = rest.join("/");
            if !object_name.is_empty() {
                object_name.push('/');
            }
            object_name.push_str(file_name);
            (CameraId::new(camera.as_str()), object_name)
        }
        None => (CameraId::new(UNKNOWN_CAMERA), file_name.to_owned()),
    }
}
