//! In-memory storage for tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ByteSource, ObjectMetadata, Storage, StorageError, StorageKey};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// Storage holding objects in a shared map.
///
/// Clones share the same objects, so a test can keep a handle and remove an
/// object after the service under test has looked it up.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<RwLock<HashMap<StorageKey, StoredObject>>>,
}

impl MemoryStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` under `key`, replacing any previous object.
    pub async fn insert(
        &self,
        key: StorageKey,
        data: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
    ) {
        let object = StoredObject {
            data: data.into(),
            last_modified,
        };
        self.objects.write().await.insert(key, object);
    }

    /// Removes the object stored under `key`.
    pub async fn remove(&self, key: &StorageKey) {
        self.objects.write().await.remove(key);
    }

    async fn object(&self, key: &StorageKey) -> Result<StoredObject, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { key: key.clone() })
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn metadata(&self, key: &StorageKey) -> Result<ObjectMetadata, StorageError> {
        let object = self.object(key).await?;
        Ok(ObjectMetadata {
            size: object.data.len() as u64,
            last_modified: object.last_modified,
        })
    }

    async fn open(&self, key: &StorageKey) -> Result<Box<dyn ByteSource>, StorageError> {
        let object = self.object(key).await?;
        Ok(Box::new(Cursor::new(object.data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_objects() {
        let storage = MemoryStorage::new();
        let handle = storage.clone();
        let key = StorageKey::new("a8f5f167f44f4964e6c998dee827110c");

        handle.insert(key.clone(), &b"riff"[..], Utc::now()).await;
        assert_eq!(storage.metadata(&key).await.unwrap().size, 4);

        handle.remove(&key).await;
        assert!(storage.metadata(&key).await.unwrap_err().is_not_found());
    }
}
