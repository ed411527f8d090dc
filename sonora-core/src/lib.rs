//! Sonora Core - track catalog, storage and byte-range streaming
//!
//! This crate provides the building blocks behind the track streaming
//! endpoint: configuration, track id resolution, access to stored audio
//! files, and the range-aware streamer that writes them to a response sink.

pub mod catalog;
pub mod config;
pub mod storage;
pub mod streaming;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use catalog::{CatalogError, ResolvedTrack, TrackCatalog, TrackRecord, TrackResolver};
pub use config::SonoraConfig;
pub use storage::{LocalStorage, Storage, StorageError, StorageKey};
pub use streaming::{RangeStreamer, StreamingError};

/// Core errors that can bubble up from any Sonora subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SonoraError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamingError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SonoraError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            SonoraError::Catalog(e) => match e {
                CatalogError::TrackNotFound { track_id } => format!("Track {track_id} not found"),
                CatalogError::Load { path, .. } => {
                    format!("Could not read track catalog {}", path.display())
                }
                CatalogError::Io(_) => "Track catalog unavailable".to_string(),
            },
            SonoraError::Storage(_) => "Storage error occurred".to_string(),
            SonoraError::Streaming(e) => match e {
                StreamingError::RangeUnsatisfiable { size } => {
                    format!("Requested range is outside the {size} byte track")
                }
                StreamingError::ResourceUnavailable { .. } => {
                    "Track audio is unavailable".to_string()
                }
            },
            SonoraError::Configuration { .. } => "Configuration error occurred".to_string(),
            SonoraError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to the client's request rather than the server.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SonoraError::Catalog(CatalogError::TrackNotFound { .. })
                | SonoraError::Streaming(StreamingError::RangeUnsatisfiable { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, SonoraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors() {
        let missing = SonoraError::from(CatalogError::TrackNotFound { track_id: 4 });
        assert!(missing.is_user_error());
        assert_eq!(missing.user_message(), "Track 4 not found");

        let io = SonoraError::from(std::io::Error::other("disk on fire"));
        assert!(!io.is_user_error());
        assert_eq!(io.user_message(), "File system error occurred");
    }
}
