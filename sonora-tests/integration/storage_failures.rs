//! Integration tests for storage misbehaving during a stream
//!
//! A scripted storage backend reports sizes and fails reads on demand, so the
//! streamer's handling of shrinking files, read errors and open failures can be
//! checked both at the sink level and through the HTTP router.

use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use sonora_core::config::{SonoraConfig, StreamingConfig};
use sonora_core::storage::{ByteSource, ObjectMetadata, Storage, StorageError, StorageKey};
use sonora_core::streaming::{
    RangeStreamer, RecordingSink, StreamRequest, StreamTermination, StreamableResource,
};
use sonora_core::{ResolvedTrack, StreamingError, TrackCatalog, TrackRecord};
use sonora_web::{AppState, build_router};
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};
use tower::ServiceExt;

/// How the scripted backend misbehaves
#[derive(Debug, Clone, Copy)]
enum Fault {
    /// Reads fail once this many bytes were returned
    ReadFailsAt(u64),
    /// Metadata claims a larger size than the data holds
    ReportsSize(u64),
    /// Metadata works but opening fails
    OpenFails,
    /// Metadata lookups fail with a non-missing error
    MetadataFails,
}

#[derive(Debug, Clone)]
struct ScriptedStorage {
    data: Vec<u8>,
    fault: Fault,
}

impl ScriptedStorage {
    fn new(size: usize, fault: Fault) -> Self {
        Self {
            data: (0..size).map(|i| (i % 256) as u8).collect(),
            fault,
        }
    }
}

#[async_trait]
impl Storage for ScriptedStorage {
    async fn metadata(&self, _key: &StorageKey) -> Result<ObjectMetadata, StorageError> {
        let size = match self.fault {
            Fault::ReportsSize(size) => size,
            Fault::MetadataFails => {
                return Err(StorageError::Io(io::Error::from(
                    io::ErrorKind::PermissionDenied,
                )));
            }
            _ => self.data.len() as u64,
        };
        Ok(ObjectMetadata {
            size,
            last_modified: Utc::now(),
        })
    }

    async fn open(&self, _key: &StorageKey) -> Result<Box<dyn ByteSource>, StorageError> {
        let fail_at = match self.fault {
            Fault::OpenFails => return Err(StorageError::Io(io::Error::other("device gone"))),
            Fault::ReadFailsAt(offset) => Some(offset),
            _ => None,
        };
        Ok(Box::new(FailingReader {
            inner: Cursor::new(self.data.clone()),
            fail_at,
        }))
    }
}

/// Reader that returns an error once its position reaches `fail_at`.
struct FailingReader {
    inner: Cursor<Vec<u8>>,
    fail_at: Option<u64>,
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let position = self.inner.position();
        let Some(fail_at) = self.fail_at else {
            return Pin::new(&mut self.inner).poll_read(cx, buf);
        };
        if position >= fail_at {
            return Poll::Ready(Err(io::Error::other("bad sector")));
        }

        let allowed = (fail_at - position).min(buf.remaining() as u64) as usize;
        let mut chunk = vec![0u8; allowed];
        let read = io::Read::read(&mut self.inner, &mut chunk)?;
        buf.put_slice(&chunk[..read]);
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for FailingReader {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.inner).poll_complete(cx)
    }
}

fn record() -> TrackRecord {
    TrackRecord {
        id: 7,
        name: "Blackbird".to_string(),
        album_name: "The Beatles".to_string(),
        artists: vec!["The Beatles".to_string()],
        mime_type: None,
    }
}

fn resolved() -> ResolvedTrack {
    let record = record();
    ResolvedTrack {
        key: sonora_core::catalog::storage_key(&record),
        record,
    }
}

fn streamer() -> RangeStreamer {
    RangeStreamer::new(StreamingConfig {
        chunk_size: 100,
        ..StreamingConfig::default()
    })
}

async fn serve(
    storage: ScriptedStorage,
    range: Option<&str>,
    sink: &mut RecordingSink,
) -> Result<sonora_core::streaming::StreamOutcome, StreamingError> {
    let resource = StreamableResource::lookup(Arc::new(storage), &resolved(), "audio/mpeg").await?;
    let request = StreamRequest::from_header(7, range);
    streamer().serve(&request, &resource, sink).await
}

#[tokio::test]
async fn test_read_failure_ends_stream_without_error() {
    let mut sink = RecordingSink::new();
    let outcome = serve(
        ScriptedStorage::new(1000, Fault::ReadFailsAt(250)),
        None,
        &mut sink,
    )
    .await
    .unwrap();

    assert_eq!(outcome.termination, StreamTermination::ReadFailed);
    assert!(outcome.terminated_early);
    assert_eq!(outcome.bytes_sent, 200);
    assert_eq!(sink.status, Some(StatusCode::OK));
    assert_eq!(sink.header("content-length"), Some("1000"));
    assert_eq!(sink.body().len(), 200);
}

#[tokio::test]
async fn test_shrunk_file_ends_stream_early() {
    let mut sink = RecordingSink::new();
    let outcome = serve(
        ScriptedStorage::new(450, Fault::ReportsSize(1000)),
        Some("bytes=300-"),
        &mut sink,
    )
    .await
    .unwrap();

    assert_eq!(outcome.termination, StreamTermination::SourceExhausted);
    assert_eq!(outcome.bytes_sent, 150);
    assert_eq!(sink.header("content-range"), Some("bytes 300-999/1000"));
    assert_eq!(sink.body()[0], (300 % 256) as u8);
}

#[tokio::test]
async fn test_open_failure_leaves_sink_untouched() {
    let mut sink = RecordingSink::new();
    let error = serve(
        ScriptedStorage::new(1000, Fault::OpenFails),
        Some("bytes=0-99"),
        &mut sink,
    )
    .await
    .unwrap_err();

    assert!(matches!(error, StreamingError::ResourceUnavailable { .. }));
    assert!(!error.is_not_found());
    assert_eq!(sink.status, None);
    assert!(sink.headers.is_empty());
    assert!(sink.chunks.is_empty());
}

#[tokio::test]
async fn test_client_disconnect_stops_reading() {
    let mut sink = RecordingSink::disconnect_after(3);
    let outcome = serve(ScriptedStorage::new(1000, Fault::ReportsSize(1000)), None, &mut sink)
        .await
        .unwrap();

    assert_eq!(outcome.termination, StreamTermination::ClientDisconnected);
    assert_eq!(outcome.bytes_sent, 300);
    assert_eq!(sink.chunks.len(), 3);
}

async fn status_through_router(storage: ScriptedStorage) -> StatusCode {
    let config = SonoraConfig::for_testing("unused", "unused.json");
    let catalog = TrackCatalog::from_records([record()]);
    let router = build_router(AppState::new(config, catalog, Arc::new(storage)));

    router
        .oneshot(
            Request::builder()
                .uri("/tracks/7/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_storage_errors_map_to_server_error() {
    assert_eq!(
        status_through_router(ScriptedStorage::new(10, Fault::MetadataFails)).await,
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        status_through_router(ScriptedStorage::new(10, Fault::OpenFails)).await,
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
