use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! newtype_string {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Return the inner string as a str slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(CameraId, "Identifies the camera that produced a capture.");
newtype_string!(ObjectKey, "A deterministic object-storage key.");

/// Camera name used when neither the file name nor the directory layout
/// identifies the source.
pub const UNKNOWN_CAMERA: &str = "unknown";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_from_str() {
        let camera = CameraId::from("cam1");
        assert_eq!(camera.as_str(), "cam1");
        assert_eq!(&*camera, "cam1");
    }

    #[test]
    fn newtype_serializes_transparently() {
        let key = ObjectKey::new("cam1/2024/01/01/120000.jpg");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"cam1/2024/01/01/120000.jpg\"");
        let back: ObjectKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
