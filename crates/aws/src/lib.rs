//! Amazon S3 backend for the camrelay upload relay.
//!
//! [`S3ObjectStore`](s3::S3ObjectStore) implements
//! [`camrelay_storage::ObjectStore`]. Credentials come from the standard AWS
//! environment chain, optionally exchanged for an assumed role via STS, and
//! the endpoint can be overridden for S3-compatible services (`LocalStack`,
//! `MinIO`).

pub mod auth;
pub mod config;
pub mod error;
pub mod s3;

pub use config::{AwsBaseConfig, S3Config};
pub use error::classify_sdk_error;
pub use s3::S3ObjectStore;
