//! On-disk storage: one file per track under a root directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use super::{ByteSource, ObjectMetadata, Storage, StorageError, StorageKey};

/// Storage backed by plain files named after their storage key.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Creates storage rooted at `root`. The directory is not required to exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory the track files live in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a key is stored at.
    ///
    /// # Errors
    ///
    /// - `StorageError::NotFound` - If the key could address something outside the root
    pub fn object_path(&self, key: &StorageKey) -> Result<PathBuf, StorageError> {
        if !key.is_plain() {
            return Err(StorageError::NotFound { key: key.clone() });
        }
        Ok(self.root.join(key.as_str()))
    }

    fn map_io(key: &StorageKey, error: std::io::Error) -> StorageError {
        if error.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound { key: key.clone() }
        } else {
            StorageError::Io(error)
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn metadata(&self, key: &StorageKey) -> Result<ObjectMetadata, StorageError> {
        let path = self.object_path(key)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| Self::map_io(key, e))?;

        if !metadata.is_file() {
            return Err(StorageError::NotFound { key: key.clone() });
        }

        let last_modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        debug!(
            "Stat {} -> {} bytes, modified {}",
            path.display(),
            metadata.len(),
            last_modified
        );

        Ok(ObjectMetadata {
            size: metadata.len(),
            last_modified,
        })
    }

    async fn open(&self, key: &StorageKey) -> Result<Box<dyn ByteSource>, StorageError> {
        let path = self.object_path(key)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| Self::map_io(key, e))?;
        Ok(Box::new(file))
    }
}
