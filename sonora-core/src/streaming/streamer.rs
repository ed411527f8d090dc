//! Byte-range streaming of stored tracks.
//!
//! Serves a resolved window of a stored object to a [`ResponseSink`] in
//! bounded chunks. Memory use is one chunk per stream regardless of file size,
//! and a client that goes away ends the stream without raising an error.

use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use super::range::{ResolvedRange, StreamRequest};
use super::sink::ResponseSink;
use super::StreamingError;
use crate::catalog::ResolvedTrack;
use crate::config::StreamingConfig;
use crate::storage::{ByteSource, Storage, StorageError, StorageKey};

/// Snapshot of a stored track taken at the start of a request.
#[derive(Clone)]
pub struct StreamableResource {
    pub key: StorageKey,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub mime_type: String,
    pub display_name: String,
    storage: Arc<dyn Storage>,
}

impl fmt::Debug for StreamableResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamableResource")
            .field("key", &self.key)
            .field("size_bytes", &self.size_bytes)
            .field("last_modified", &self.last_modified)
            .field("mime_type", &self.mime_type)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

impl StreamableResource {
    /// Looks up size and modification time of a resolved track.
    ///
    /// # Errors
    ///
    /// - `StreamingError::ResourceUnavailable` - If the track file is missing or cannot be queried
    pub async fn lookup(
        storage: Arc<dyn Storage>,
        track: &ResolvedTrack,
        mime_type: impl Into<String>,
    ) -> Result<Self, StreamingError> {
        let metadata = storage
            .metadata(&track.key)
            .await
            .map_err(|source| StreamingError::ResourceUnavailable {
                key: track.key.clone(),
                source,
            })?;

        Ok(Self {
            key: track.key.clone(),
            size_bytes: metadata.size,
            last_modified: metadata.last_modified,
            mime_type: mime_type.into(),
            display_name: track.display_name().to_string(),
            storage,
        })
    }

    /// Opens an independent reader on the underlying object.
    ///
    /// # Errors
    ///
    /// - `StorageError::NotFound` - If the object disappeared since the lookup
    /// - `StorageError::Io` - If it could not be opened
    pub async fn open_reader(&self) -> Result<Box<dyn ByteSource>, StorageError> {
        self.storage.open(&self.key).await
    }
}

/// Why a stream loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTermination {
    /// The whole window was delivered
    Completed,
    /// The client stopped accepting data
    ClientDisconnected,
    /// The object ended before the window did
    SourceExhausted,
    /// Reading the object failed after headers were sent
    ReadFailed,
}

/// Result of a stream that got as far as sending headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutcome {
    pub bytes_sent: u64,
    pub terminated_early: bool,
    pub termination: StreamTermination,
}

impl StreamOutcome {
    fn new(bytes_sent: u64, termination: StreamTermination) -> Self {
        Self {
            bytes_sent,
            terminated_early: termination != StreamTermination::Completed,
            termination,
        }
    }
}

/// Streams byte windows of stored resources to response sinks.
///
/// Holds no per-request state, so one instance serves all requests concurrently.
#[derive(Debug, Clone, Default)]
pub struct RangeStreamer {
    config: StreamingConfig,
}

impl RangeStreamer {
    pub fn new(config: StreamingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Serves `request` from `resource` into `sink`.
    ///
    /// The range is resolved and the reader opened and positioned before
    /// anything reaches the sink, so a failure there leaves the sink untouched.
    /// The reader is dropped on every exit path.
    ///
    /// # Errors
    ///
    /// - `StreamingError::ResourceUnavailable` - If the object cannot be opened or positioned
    /// - `StreamingError::RangeUnsatisfiable` - If the strict range policy rejects the range
    pub async fn serve<S>(
        &self,
        request: &StreamRequest,
        resource: &StreamableResource,
        sink: &mut S,
    ) -> Result<StreamOutcome, StreamingError>
    where
        S: ResponseSink + ?Sized,
    {
        let window = ResolvedRange::resolve(
            request.requested_range,
            resource.size_bytes,
            self.config.range_policy,
        )?;

        let unavailable = |source: StorageError| StreamingError::ResourceUnavailable {
            key: resource.key.clone(),
            source,
        };

        let mut reader = resource.open_reader().await.map_err(unavailable)?;
        if let Some(window) = window {
            reader
                .seek(SeekFrom::Start(window.begin))
                .await
                .map_err(|e| unavailable(StorageError::Io(e)))?;
        }

        write_head(sink, resource, window.as_ref());

        let Some(window) = window else {
            info!(
                "Resource {} ({}) is empty, sent headers only",
                request.resource_id, resource.key
            );
            return Ok(StreamOutcome::new(0, StreamTermination::Completed));
        };

        info!(
            "Streaming resource {} ({}): bytes {}-{}/{} partial={}",
            request.resource_id,
            resource.key,
            window.begin,
            window.end,
            resource.size_bytes,
            window.is_partial
        );

        let outcome = self.pump(&mut reader, window, sink).await;

        match outcome.termination {
            StreamTermination::Completed => info!(
                "Finished resource {}: {} bytes sent",
                request.resource_id, outcome.bytes_sent
            ),
            StreamTermination::ClientDisconnected => debug!(
                "Client left resource {} after {} of {} bytes",
                request.resource_id,
                outcome.bytes_sent,
                window.len()
            ),
            StreamTermination::SourceExhausted => warn!(
                "Resource {} ended after {} of {} bytes, file shrank mid-stream",
                request.resource_id,
                outcome.bytes_sent,
                window.len()
            ),
            StreamTermination::ReadFailed => warn!(
                "Resource {} stopped after {} of {} bytes on read failure",
                request.resource_id,
                outcome.bytes_sent,
                window.len()
            ),
        }

        Ok(outcome)
    }

    /// Copies `window` from `reader` to `sink` in strictly increasing offset order.
    async fn pump<R, S>(&self, reader: &mut R, window: ResolvedRange, sink: &mut S) -> StreamOutcome
    where
        R: AsyncRead + Unpin + ?Sized,
        S: ResponseSink + ?Sized,
    {
        let chunk_size = self.config.effective_chunk_size() as u64;
        let mut position = window.begin;
        let mut bytes_sent = 0u64;

        let termination = loop {
            if position > window.end {
                break StreamTermination::Completed;
            }
            if !sink.is_client_connected() {
                break StreamTermination::ClientDisconnected;
            }

            let wanted = chunk_size.min(window.end - position + 1) as usize;
            let mut chunk = BytesMut::zeroed(wanted);
            let filled = match fill_chunk(reader, &mut chunk).await {
                Ok(filled) => filled,
                Err(e) => {
                    warn!("Read failed at offset {}: {}", position, e);
                    break StreamTermination::ReadFailed;
                }
            };
            if filled == 0 {
                break StreamTermination::SourceExhausted;
            }
            chunk.truncate(filled);

            if sink.write_chunk(chunk.freeze()).await.is_err() {
                break StreamTermination::ClientDisconnected;
            }

            bytes_sent += filled as u64;
            position += filled as u64;

            if filled < wanted {
                break StreamTermination::SourceExhausted;
            }
        };

        StreamOutcome::new(bytes_sent, termination)
    }
}

/// Reads until `buf` is full or the reader hits end of data.
async fn fill_chunk<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn write_head<S>(sink: &mut S, resource: &StreamableResource, window: Option<&ResolvedRange>)
where
    S: ResponseSink + ?Sized,
{
    let partial = window.filter(|w| w.is_partial);
    let content_length = window.map_or(0, ResolvedRange::len);

    sink.set_status(if partial.is_some() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    });

    let content_type = HeaderValue::from_str(&resource.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    sink.set_header(header::CONTENT_TYPE, content_type);
    sink.set_header(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, must-revalidate, max-age=0"),
    );
    sink.set_header(header::PRAGMA, HeaderValue::from_static("no-cache"));
    sink.set_header(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    sink.set_header(header::CONTENT_LENGTH, HeaderValue::from(content_length));

    if let Some(window) = partial
        && let Ok(value) = HeaderValue::from_str(&window.content_range(resource.size_bytes))
    {
        sink.set_header(header::CONTENT_RANGE, value);
    }

    if let Ok(value) = HeaderValue::from_str(&format!(
        "inline; filename=\"{}\"",
        header_safe_filename(&resource.display_name)
    )) {
        sink.set_header(header::CONTENT_DISPOSITION, value);
    }

    sink.set_header(
        HeaderName::from_static("content-transfer-encoding"),
        HeaderValue::from_static("binary"),
    );

    if let Ok(value) = HeaderValue::from_str(&http_date(resource.last_modified)) {
        sink.set_header(header::LAST_MODIFIED, value);
    }
}

/// Formats a timestamp as an HTTP IMF-fixdate.
pub fn http_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Replaces characters that cannot appear inside a quoted header parameter.
fn header_safe_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim().is_empty() {
        "track".to_string()
    } else {
        cleaned
    }
}
