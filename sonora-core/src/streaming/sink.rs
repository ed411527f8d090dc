//! Response sink abstraction.
//!
//! The streamer never touches the HTTP layer directly. It sets status and
//! headers, writes chunks in order, and checks peer liveness through this
//! capability, which lets the same loop run against a hyper body channel or
//! an in-memory recorder.

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;

/// The peer stopped accepting data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Client connection closed")]
pub struct SinkClosed;

/// Destination of a streamed response.
#[async_trait]
pub trait ResponseSink: Send {
    /// Sets the response status. Must be called before the first chunk.
    fn set_status(&mut self, status: StatusCode);

    /// Adds a response header. Must be called before the first chunk.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Writes the next chunk of the body.
    ///
    /// # Errors
    ///
    /// - `SinkClosed` - If the client is gone and the chunk was not delivered
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SinkClosed>;

    /// Cheap liveness check, made before every read.
    fn is_client_connected(&self) -> bool;
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingSink;

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use axum::http::HeaderMap;

    use super::*;

    /// Sink that keeps everything written to it.
    ///
    /// `disconnect_after(k)` makes the client vanish once `k` chunks were delivered.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub status: Option<StatusCode>,
        pub headers: HeaderMap,
        pub chunks: Vec<Bytes>,
        disconnect_after: Option<usize>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn disconnect_after(chunks: usize) -> Self {
            Self {
                disconnect_after: Some(chunks),
                ..Self::default()
            }
        }

        /// All chunks concatenated.
        pub fn body(&self) -> Vec<u8> {
            self.chunks.iter().flat_map(|c| c.iter().copied()).collect()
        }

        /// Header value as a string, if present and printable.
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(name).and_then(|v| v.to_str().ok())
        }
    }

    #[async_trait]
    impl ResponseSink for RecordingSink {
        fn set_status(&mut self, status: StatusCode) {
            self.status = Some(status);
        }

        fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
            self.headers.insert(name, value);
        }

        async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
            if !self.is_client_connected() {
                return Err(SinkClosed);
            }
            self.chunks.push(chunk);
            Ok(())
        }

        fn is_client_connected(&self) -> bool {
            self.disconnect_after
                .is_none_or(|limit| self.chunks.len() < limit)
        }
    }
}
