use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use camrelay_core::UploadTarget;
use tracing::debug;

use crate::error::StorageError;
use crate::store::ObjectStore;

/// An object held by [`MemoryObjectStore`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object body.
    pub body: Bytes,
    /// `Content-Type` recorded on write.
    pub content_type: String,
    /// User metadata recorded on write.
    pub metadata: BTreeMap<String, String>,
}

/// In-memory object store.
///
/// Useful for local development and tests. Failures can be scripted with
/// [`fail_next`](Self::fail_next): each queued error is returned by one
/// subsequent `put_object` call, in order, before writes succeed again.
///
/// The internal locks are standard `Mutex`es and are never held across an
/// `.await`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    scripted: Mutex<VecDeque<StorageError>>,
    attempts: AtomicUsize,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for a future `put_object` call.
    pub fn fail_next(&self, error: StorageError) {
        self.scripted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(error);
    }

    /// Look up a stored object.
    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
    }

    /// Number of distinct objects held.
    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no object has been written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total `put_object` calls, successful or not.
    pub fn put_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ObjectStore for MemoryObjectStore {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "memory"
    }

    #[allow(clippy::unused_async)]
    async fn put_object(&self, target: &UploadTarget, body: Bytes) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .scripted
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }

        debug!(bucket = %target.bucket, key = %target.key, size = body.len(), "memory store write");
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                (target.bucket.clone(), target.key.to_string()),
                StoredObject {
                    body,
                    content_type: target.content_type.clone(),
                    metadata: target.metadata.clone(),
                },
            );
        Ok(())
    }

    #[allow(clippy::unused_async)]
    async fn health_check(&self, _bucket: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use camrelay_core::ObjectKey;

    use super::*;

    fn target(key: &str) -> UploadTarget {
        UploadTarget {
            bucket: "cams".into(),
            key: ObjectKey::new(key),
            content_type: "image/jpeg".into(),
            metadata: BTreeMap::from([("camera".to_owned(), "cam1".to_owned())]),
        }
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = MemoryObjectStore::new();
        store
            .put_object(&target("a.jpg"), Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        let obj = store.get("cams", "a.jpg").unwrap();
        assert_eq!(obj.body.as_ref(), b"jpeg");
        assert_eq!(obj.content_type, "image/jpeg");
        assert_eq!(obj.metadata.get("camera").unwrap(), "cam1");
        assert!(store.get("other", "a.jpg").is_none());
    }

    #[tokio::test]
    async fn same_key_overwrites() {
        let store = MemoryObjectStore::new();
        store.put_object(&target("a.jpg"), Bytes::from_static(b"1")).await.unwrap();
        store.put_object(&target("a.jpg"), Bytes::from_static(b"2")).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.put_attempts(), 2);
        assert_eq!(store.get("cams", "a.jpg").unwrap().body.as_ref(), b"2");
    }

    #[tokio::test]
    async fn scripted_failures_are_returned_in_order() {
        let store = MemoryObjectStore::new();
        store.fail_next(StorageError::Throttled);
        store.fail_next(StorageError::Connection("reset".into()));

        let first = store.put_object(&target("a.jpg"), Bytes::new()).await.unwrap_err();
        assert!(matches!(first, StorageError::Throttled));
        let second = store.put_object(&target("a.jpg"), Bytes::new()).await.unwrap_err();
        assert!(matches!(second, StorageError::Connection(_)));
        store.put_object(&target("a.jpg"), Bytes::new()).await.unwrap();

        assert_eq!(store.put_attempts(), 3);
        assert_eq!(store.len(), 1);
    }
}
