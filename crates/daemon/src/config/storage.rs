use camrelay_aws::S3Config;
use serde::Deserialize;

/// The `[storage]` section: destination bucket and S3 connection settings.
///
/// Region, endpoint and assume-role fields sit directly in the section.
///
/// # Example
///
/// ```toml
/// [storage]
/// bucket = "security-cam"
/// prefix = "captures/"
/// region = "us-east-1"
/// endpoint_url = "http://localhost:4566"
/// force_path_style = true
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// Destination bucket.
    #[serde(default)]
    pub bucket: Option<String>,
    /// Optional prefix prepended to every object key.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(flatten)]
    pub s3: S3Config,
}
