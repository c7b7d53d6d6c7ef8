use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use camrelay_storage::StorageError;

/// Map an SDK error from any S3 operation to a [`StorageError`].
pub fn from_sdk_error<E>(err: &SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    if matches!(err, SdkError::TimeoutError(_)) {
        return StorageError::Timeout(DisplayErrorContext(err).to_string());
    }
    let status = err.raw_response().map(|r| r.status().as_u16());
    let message = DisplayErrorContext(err).to_string();
    classify_sdk_error(status, err.code(), &message)
}

/// Classify an S3 failure from its HTTP status, error code and rendered
/// message.
///
/// Error codes win over status codes, which win over message heuristics.
/// Anything unrecognized is a transient [`StorageError::Service`] so it is
/// retried up to the relay's retry limit rather than halting the process.
pub fn classify_sdk_error(status: Option<u16>, code: Option<&str>, message: &str) -> StorageError {
    match code {
        Some("SlowDown" | "Throttling" | "ThrottlingException" | "RequestLimitExceeded") => {
            return StorageError::Throttled;
        }
        Some("RequestTimeout") => return StorageError::Timeout(message.to_owned()),
        Some(
            "InvalidAccessKeyId"
            | "SignatureDoesNotMatch"
            | "ExpiredToken"
            | "InvalidToken"
            | "TokenRefreshRequired",
        ) => return StorageError::Credentials(message.to_owned()),
        Some("AccessDenied" | "AllAccessDisabled" | "AccountProblem") => {
            return StorageError::AccessDenied(message.to_owned());
        }
        Some("NoSuchBucket") => return StorageError::BucketNotFound(message.to_owned()),
        Some("InvalidBucketName" | "PermanentRedirect" | "AuthorizationHeaderMalformed") => {
            return StorageError::Configuration(message.to_owned());
        }
        _ => {}
    }

    match status {
        Some(429 | 503) => return StorageError::Throttled,
        Some(401) => return StorageError::Credentials(message.to_owned()),
        Some(403) => return StorageError::AccessDenied(message.to_owned()),
        Some(404) => return StorageError::BucketNotFound(message.to_owned()),
        Some(301) => return StorageError::Configuration(message.to_owned()),
        _ => {}
    }

    let lower = message.to_lowercase();
    if lower.contains("no credentials")
        || lower.contains("credentials provider")
        || lower.contains("failed to load credentials")
    {
        StorageError::Credentials(message.to_owned())
    } else if lower.contains("throttl") || lower.contains("rate exceed") || lower.contains("too many") {
        StorageError::Throttled
    } else if lower.contains("timeout") || lower.contains("timed out") {
        StorageError::Timeout(message.to_owned())
    } else if lower.contains("connection")
        || lower.contains("connect")
        || lower.contains("dns")
        || lower.contains("dispatch failure")
        || lower.contains("network")
    {
        StorageError::Connection(message.to_owned())
    } else {
        StorageError::Service(message.to_owned())
    }
}
