//! Storage layer for track audio files.
//!
//! Defines the byte-addressable storage interface the streamer reads from,
//! with an on-disk implementation and an in-memory one for tests.

pub mod local;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use local::LocalStorage;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStorage;
use tokio::io::{AsyncRead, AsyncSeek};

/// Opaque name of a stored object.
///
/// Track keys are 32-character lowercase MD5 hex digests, see [`crate::catalog::storage_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Wraps an already derived key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that the key names a single object and cannot escape the storage root.
    pub fn is_plain(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(['/', '\\', '\0'])
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Size and modification time of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Object length in bytes
    pub size: u64,
    /// Last modification time
    pub last_modified: DateTime<Utc>,
}

/// Seekable byte stream opened on a stored object.
pub trait ByteSource: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T> ByteSource for T where T: AsyncRead + AsyncSeek + Unpin + Send {}

/// Read access to stored track files.
///
/// Implementations hand out independent sources, so concurrent requests for
/// the same key never share a read cursor.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Looks up size and modification time without opening the object.
    ///
    /// # Errors
    ///
    /// - `StorageError::NotFound` - If no object is stored under `key`
    /// - `StorageError::Io` - If the backend could not be queried
    async fn metadata(&self, key: &StorageKey) -> Result<ObjectMetadata, StorageError>;

    /// Opens a seekable read stream positioned at offset 0.
    ///
    /// # Errors
    ///
    /// - `StorageError::NotFound` - If no object is stored under `key`
    /// - `StorageError::Io` - If the object exists but could not be opened
    async fn open(&self, key: &StorageKey) -> Result<Box<dyn ByteSource>, StorageError>;
}

/// Errors that occur while accessing stored objects.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Nothing is stored under the requested key
    #[error("Object {key} not found")]
    NotFound {
        /// Key that was looked up
        key: StorageKey,
    },

    /// Standard I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Checks if the error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound { .. } => true,
            StorageError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_keys() {
        assert!(StorageKey::new("df82ffdda3b9fb67888f56105d7aa3f9").is_plain());
        assert!(!StorageKey::new("").is_plain());
        assert!(!StorageKey::new("..").is_plain());
        assert!(!StorageKey::new("../etc/passwd").is_plain());
        assert!(!StorageKey::new("a\\b").is_plain());
    }

    #[test]
    fn test_io_not_found_counts_as_missing() {
        let error = StorageError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(error.is_not_found());

        let error = StorageError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(!error.is_not_found());
    }
}
