use aws_config::{ConfigLoader, Region};
use tracing::{debug, info};

use crate::config::AwsBaseConfig;

const DEFAULT_SESSION_NAME: &str = "camrelay";

/// Build an AWS SDK configuration from the given [`AwsBaseConfig`].
///
/// Uses the standard AWS SDK environment credential chain and optionally:
/// - Overrides the endpoint URL (e.g. `LocalStack`)
/// - Assumes an IAM role via STS if `role_arn` is configured; the SDK's
///   `AssumeRoleProvider` refreshes the session before it expires
///
/// # Examples
///
/// ```no_run
/// use camrelay_aws::config::AwsBaseConfig;
/// use camrelay_aws::auth::build_sdk_config;
///
/// # async fn example() {
/// let config = AwsBaseConfig::new("us-east-1")
///     .with_endpoint_url("http://localhost:4566");
/// let sdk_config = build_sdk_config(&config).await;
/// # }
/// ```
pub async fn build_sdk_config(config: &AwsBaseConfig) -> aws_config::SdkConfig {
    let Some(role_arn) = &config.role_arn else {
        return base_loader(config).load().await;
    };

    let session_name = config
        .session_name
        .as_deref()
        .unwrap_or(DEFAULT_SESSION_NAME);
    info!(role_arn = %role_arn, session_name = %session_name, "assuming IAM role via STS");

    // STS calls use the base credentials and the same endpoint override.
    let base_config = base_loader(config).load().await;

    let mut provider_builder = aws_config::sts::AssumeRoleProvider::builder(role_arn)
        .session_name(session_name)
        .region(Region::new(config.region.clone()));
    if let Some(external_id) = &config.external_id {
        provider_builder = provider_builder.external_id(external_id);
    }
    let assume_role_provider = provider_builder.configure(&base_config).build().await;

    base_loader(config)
        .credentials_provider(assume_role_provider)
        .load()
        .await
}

fn base_loader(config: &AwsBaseConfig) -> ConfigLoader {
    let mut loader = aws_config::from_env().region(Region::new(config.region.clone()));
    if let Some(endpoint) = &config.endpoint_url {
        debug!(endpoint = %endpoint, "using custom AWS endpoint");
        loader = loader.endpoint_url(endpoint);
    }
    loader
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use super::*;

    // The SDK needs a TLS root store on `load()`, so these only run with the
    // `integration` feature.

    #[tokio::test]
    async fn build_sdk_config_sets_region() {
        let config = AwsBaseConfig::new("ap-northeast-1");
        let sdk_config = build_sdk_config(&config).await;
        assert_eq!(
            sdk_config.region().map(|r| r.as_ref()),
            Some("ap-northeast-1")
        );
    }

    #[tokio::test]
    async fn build_sdk_config_with_endpoint() {
        let config = AwsBaseConfig::new("us-west-2").with_endpoint_url("http://localhost:4566");
        let sdk_config = build_sdk_config(&config).await;
        assert_eq!(sdk_config.region().map(|r| r.as_ref()), Some("us-west-2"));
        assert_eq!(sdk_config.endpoint_url(), Some("http://localhost:4566"));
    }
}
