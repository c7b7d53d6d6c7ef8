use thiserror::Error;

/// Errors returned by object-storage backends.
///
/// Every variant is either transient ([`is_retryable`](Self::is_retryable))
/// or permanent ([`is_permanent`](Self::is_permanent)); there is no third
/// class.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The service throttled the request.
    #[error("request throttled")]
    Throttled,

    /// A network or transport-level error occurred.
    #[error("connection error: {0}")]
    Connection(String),

    /// The transfer did not finish within the allowed duration.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The service failed the request for a reason that may clear on retry.
    #[error("service error: {0}")]
    Service(String),

    /// Credentials are missing, expired, or rejected.
    #[error("credential error: {0}")]
    Credentials(String),

    /// The credentials are valid but not allowed to write.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The destination bucket does not exist.
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// The backend configuration is invalid.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Returns `true` if the error is transient and the upload may succeed on
    /// a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled | Self::Connection(_) | Self::Timeout(_) | Self::Service(_)
        )
    }

    /// Returns `true` if retrying cannot help and an operator must fix the
    /// configuration or credentials.
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// Short class name used in log fields.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Throttled => "throttled",
            Self::Connection(_) => "connection",
            Self::Timeout(_) => "timeout",
            Self::Service(_) => "service",
            Self::Credentials(_) => "credentials",
            Self::AccessDenied(_) => "access_denied",
            Self::BucketNotFound(_) => "bucket_not_found",
            Self::Configuration(_) => "configuration",
        }
    }
}
