use async_trait::async_trait;
use bytes::Bytes;
use camrelay_core::UploadTarget;

use crate::error::StorageError;

/// Strongly-typed object-store trait with native `async fn`.
///
/// This trait is **not** object-safe because it uses native `async fn` methods
/// (which desugar to opaque `impl Future` return types). If you need dynamic
/// dispatch, use [`DynObjectStore`] instead -- every `ObjectStore`
/// automatically implements `DynObjectStore` via a blanket implementation.
pub trait ObjectStore: Send + Sync {
    /// Returns the name of this backend, used in logs.
    fn name(&self) -> &str;

    /// Write `body` to `target`, replacing any existing object under the
    /// same key.
    fn put_object(
        &self,
        target: &UploadTarget,
        body: Bytes,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Verify the backend is reachable and the destination is writable.
    fn health_check(
        &self,
        bucket: &str,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;
}

/// Object-safe store trait for use behind `Arc<dyn DynObjectStore>`.
///
/// You generally should not implement this trait directly -- instead implement
/// [`ObjectStore`] and rely on the blanket implementation.
#[async_trait]
pub trait DynObjectStore: Send + Sync {
    /// Returns the name of this backend, used in logs.
    fn name(&self) -> &str;

    /// Write `body` to `target`.
    async fn put_object(&self, target: &UploadTarget, body: Bytes) -> Result<(), StorageError>;

    /// Verify the backend is reachable and the destination is writable.
    async fn health_check(&self, bucket: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: ObjectStore + Sync> DynObjectStore for T {
    fn name(&self) -> &str {
        ObjectStore::name(self)
    }

    async fn put_object(&self, target: &UploadTarget, body: Bytes) -> Result<(), StorageError> {
        ObjectStore::put_object(self, target, body).await
    }

    async fn health_check(&self, bucket: &str) -> Result<(), StorageError> {
        ObjectStore::health_check(self, bucket).await
    }
}
