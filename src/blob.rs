//! Blob store boundary: media bytes live outside the registry and are
//! addressed by an opaque storage key.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{aws::AmazonS3Builder, path::Path as ObjectPath, ObjectStore};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::model::MediaType;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a fresh key and return the key.
    async fn put(&self, media_type: MediaType, bytes: Bytes) -> CoreResult<String>;

    /// Idempotent: deleting a missing key succeeds.
    async fn delete(&self, storage_key: &str) -> CoreResult<()>;

    async fn fetch(&self, storage_key: &str) -> CoreResult<Bytes>;
}

/// [`BlobStore`] over any `object_store` backend (S3 in production, the
/// in-memory store in tests).
#[derive(Clone)]
pub struct ObjectBlobStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectBlobStore {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// S3 bucket; credentials and region come from the usual AWS env vars.
    pub fn s3(bucket: &str, prefix: impl Into<String>) -> CoreResult<Self> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| CoreError::internal(format!("s3 builder: {e}")))?;
        Ok(Self::new(Arc::new(store), prefix))
    }

    fn new_key(&self, media_type: MediaType) -> String {
        format!("{}/{}/{}", self.prefix, media_type.as_str(), Uuid::new_v4())
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    #[tracing::instrument(skip(self, bytes), fields(size_bytes = bytes.len()))]
    async fn put(&self, media_type: MediaType, bytes: Bytes) -> CoreResult<String> {
        let key = self.new_key(media_type);
        self.store
            .put(&ObjectPath::from(key.as_str()), bytes.into())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "blob put failed");
                CoreError::from(e)
            })?;
        tracing::debug!(storage_key = %key, "blob stored");
        Ok(key)
    }

    async fn delete(&self, storage_key: &str) -> CoreResult<()> {
        match self.store.delete(&ObjectPath::from(storage_key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch(&self, storage_key: &str) -> CoreResult<Bytes> {
        let got = match self.store.get(&ObjectPath::from(storage_key)).await {
            Ok(got) => got,
            // metadata said live but the blob is gone
            Err(object_store::Error::NotFound { .. }) => return Err(CoreError::NotFound),
            Err(e) => return Err(e.into()),
        };
        Ok(got.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn store() -> ObjectBlobStore {
        ObjectBlobStore::new(Arc::new(InMemory::new()), "media")
    }

    #[tokio::test]
    async fn put_fetch_delete() {
        let s = store();
        let key = s.put(MediaType::Image, Bytes::from_static(b"png")).await.unwrap();
        assert!(key.starts_with("media/image/"));
        assert_eq!(s.fetch(&key).await.unwrap(), Bytes::from_static(b"png"));
        s.delete(&key).await.unwrap();
        assert!(matches!(s.fetch(&key).await, Err(CoreError::NotFound)));
        // second delete is a no-op
        s.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn identical_bytes_get_distinct_keys() {
        let s = store();
        let a = s.put(MediaType::Video, Bytes::from_static(b"x")).await.unwrap();
        let b = s.put(MediaType::Video, Bytes::from_static(b"x")).await.unwrap();
        assert_ne!(a, b);
    }
}
