//! HTTP byte-range streaming of stored tracks.
//!
//! A request is parsed once into a [`StreamRequest`], resolved against the
//! resource size into a [`ResolvedRange`], and served by [`RangeStreamer`]
//! into any [`ResponseSink`].

pub mod range;
pub mod sink;
pub mod streamer;

pub use range::{RangeRequest, ResolvedRange, StreamRequest, parse_range_header};
#[cfg(any(test, feature = "test-utils"))]
pub use sink::RecordingSink;
pub use sink::{ResponseSink, SinkClosed};
pub use streamer::{
    RangeStreamer, StreamOutcome, StreamTermination, StreamableResource, http_date,
};

use crate::storage::{StorageError, StorageKey};

/// Errors that end a streaming request before any bytes are sent.
///
/// Client disconnects and malformed range headers are not errors; they show
/// up in [`StreamOutcome`] and in the response status respectively.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    /// Stored object is missing or cannot be read
    #[error("Resource {key} unavailable: {source}")]
    ResourceUnavailable {
        /// Key of the object that could not be opened
        key: StorageKey,
        /// Underlying storage failure
        #[source]
        source: StorageError,
    },

    /// Range starts past the end of the resource
    #[error("Range not satisfiable for resource of {size} bytes")]
    RangeUnsatisfiable {
        /// Total size of the resource
        size: u64,
    },
}

impl StreamingError {
    /// Checks if the resource simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StreamingError::ResourceUnavailable { source, .. } if source.is_not_found()
        )
    }
}
