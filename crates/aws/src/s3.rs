use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use camrelay_core::UploadTarget;
use camrelay_storage::{ObjectStore, StorageError};
use tracing::{debug, error, info, instrument};

use crate::auth::build_sdk_config;
use crate::config::S3Config;
use crate::error::from_sdk_error;

/// Amazon S3 (or S3-compatible) object store.
pub struct S3ObjectStore {
    config: S3Config,
    client: aws_sdk_s3::Client,
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("config", &self.config)
            .field("client", &"<S3Client>")
            .finish()
    }
}

impl S3ObjectStore {
    /// Create a store by resolving credentials and building an SDK client.
    pub async fn new(config: S3Config) -> Self {
        let sdk_config = build_sdk_config(&config.aws).await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_config);
        Self { config, client }
    }

    /// Create a store with a pre-built client (for testing).
    pub fn with_client(config: S3Config, client: aws_sdk_s3::Client) -> Self {
        Self { config, client }
    }

    /// The configuration this store was built from.
    pub fn config(&self) -> &S3Config {
        &self.config
    }
}

impl ObjectStore for S3ObjectStore {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "aws-s3"
    }

    #[instrument(skip(self, target, body), fields(bucket = %target.bucket, key = %target.key, size = body.len()))]
    async fn put_object(&self, target: &UploadTarget, body: Bytes) -> Result<(), StorageError> {
        debug!("uploading object to S3");

        let mut request = self
            .client
            .put_object()
            .bucket(&target.bucket)
            .key(target.key.as_str())
            .content_type(&target.content_type)
            .body(ByteStream::from(body));
        for (k, v) in &target.metadata {
            request = request.metadata(k, v);
        }

        request.send().await.map_err(|e| {
            let err = from_sdk_error(&e);
            error!(error = %err, error_class = err.class(), "S3 put_object failed");
            err
        })?;

        info!("S3 object uploaded");
        Ok(())
    }

    #[instrument(skip(self), fields(provider = "aws-s3"))]
    async fn health_check(&self, bucket: &str) -> Result<(), StorageError> {
        debug!("performing S3 health check");
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| {
                let err = from_sdk_error(&e);
                error!(error = %err, error_class = err.class(), "S3 health check failed");
                err
            })?;
        info!(bucket = %bucket, "S3 health check passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

    use super::*;

    fn offline_client() -> aws_sdk_s3::Client {
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKIDEXAMPLE", "secret", None, None, "test"))
            .build();
        aws_sdk_s3::Client::from_conf(conf)
    }

    #[test]
    fn name_and_debug() {
        let store = S3ObjectStore::with_client(S3Config::new("us-east-1"), offline_client());
        assert_eq!(ObjectStore::name(&store), "aws-s3");
        let debug = format!("{store:?}");
        assert!(debug.contains("S3ObjectStore"));
        assert!(debug.contains("<S3Client>"));
    }

    #[test]
    fn config_is_kept() {
        let config = S3Config::new("eu-central-1").with_path_style();
        let store = S3ObjectStore::with_client(config, offline_client());
        assert_eq!(store.config().aws.region, "eu-central-1");
        assert!(store.config().force_path_style);
    }
}
