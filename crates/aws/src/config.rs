use serde::{Deserialize, Serialize};

/// Connection settings shared by every AWS client camrelay builds.
///
/// `endpoint_url` points the client at an S3-compatible service for local
/// development (e.g. `LocalStack`); `role_arn` switches to STS assume-role
/// credentials for cross-account buckets.
#[derive(Clone, Serialize, Deserialize)]
pub struct AwsBaseConfig {
    /// AWS region (e.g. `"us-east-1"`).
    #[serde(default = "default_region")]
    pub region: String,

    /// Optional IAM role ARN to assume via STS.
    #[serde(default)]
    pub role_arn: Option<String>,

    /// Optional endpoint URL override.
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Optional STS session name (defaults to `"camrelay"`).
    #[serde(default)]
    pub session_name: Option<String>,

    /// Optional external ID for cross-account trust policies.
    #[serde(default)]
    pub external_id: Option<String>,
}

impl std::fmt::Debug for AwsBaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsBaseConfig")
            .field("region", &self.region)
            .field("role_arn", &self.role_arn.as_ref().map(|_| "[REDACTED]"))
            .field("endpoint_url", &self.endpoint_url)
            .field("session_name", &self.session_name)
            .field("external_id", &self.external_id.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl AwsBaseConfig {
    /// Create a new `AwsBaseConfig` with the given region.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            role_arn: None,
            endpoint_url: None,
            session_name: None,
            external_id: None,
        }
    }

    /// Set an IAM role ARN to assume via STS.
    #[must_use]
    pub fn with_role_arn(mut self, role_arn: impl Into<String>) -> Self {
        self.role_arn = Some(role_arn.into());
        self
    }

    /// Set an endpoint URL override.
    #[must_use]
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// Set the STS session name for assume-role.
    #[must_use]
    pub fn with_session_name(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = Some(session_name.into());
        self
    }

    /// Set the external ID for cross-account trust policies.
    #[must_use]
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

impl Default for AwsBaseConfig {
    fn default() -> Self {
        Self::new(default_region())
    }
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

/// Configuration for [`S3ObjectStore`](crate::s3::S3ObjectStore).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    /// Region, endpoint and credential settings.
    #[serde(flatten)]
    pub aws: AwsBaseConfig,

    /// Use path-style addressing (`endpoint/bucket/key`). Most S3-compatible
    /// servers without wildcard DNS need this.
    #[serde(default)]
    pub force_path_style: bool,
}

impl S3Config {
    /// Create a new `S3Config` with the given AWS region.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            aws: AwsBaseConfig::new(region),
            force_path_style: false,
        }
    }

    /// Set the endpoint URL override.
    #[must_use]
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.aws.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// Enable path-style addressing.
    #[must_use]
    pub fn with_path_style(mut self) -> Self {
        self.force_path_style = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_sets_region() {
        let config = AwsBaseConfig::new("eu-west-1");
        assert_eq!(config.region, "eu-west-1");
        assert!(config.role_arn.is_none());
        assert!(config.endpoint_url.is_none());
    }

    #[test]
    fn builder_chain() {
        let config = AwsBaseConfig::new("us-east-1")
            .with_role_arn("arn:aws:iam::123456789012:role/uploader")
            .with_endpoint_url("http://localhost:4566")
            .with_session_name("cams")
            .with_external_id("ext-1");
        assert_eq!(
            config.role_arn.as_deref(),
            Some("arn:aws:iam::123456789012:role/uploader")
        );
        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:4566"));
        assert_eq!(config.session_name.as_deref(), Some("cams"));
        assert_eq!(config.external_id.as_deref(), Some("ext-1"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AwsBaseConfig::new("us-east-1")
            .with_role_arn("arn:aws:iam::123456789012:role/uploader")
            .with_external_id("very-secret");
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("123456789012"));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn s3_config_flattens_base_fields() {
        let json = serde_json::json!({
            "region": "ap-southeast-2",
            "endpoint_url": "http://minio:9000",
            "force_path_style": true
        });
        let config: S3Config = serde_json::from_value(json).unwrap();
        assert_eq!(config.aws.region, "ap-southeast-2");
        assert_eq!(config.aws.endpoint_url.as_deref(), Some("http://minio:9000"));
        assert!(config.force_path_style);
    }

    #[test]
    fn s3_config_defaults() {
        let config: S3Config = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config.aws.region, "us-east-1");
        assert!(!config.force_path_style);

        let built = S3Config::new("us-west-2")
            .with_endpoint_url("http://localhost:4566")
            .with_path_style();
        assert_eq!(built.aws.region, "us-west-2");
        assert!(built.force_path_style);
    }
}
