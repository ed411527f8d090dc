//! Track streaming handler
//!
//! Resolves the track, snapshots its stored file, and hands the request to
//! the core streamer running in its own task. The handler returns as soon
//! as the streamer has committed status and headers; the body follows
//! through a bounded channel.

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::Response;
use serde::Deserialize;
use sonora_core::config::StreamingConfig;
use sonora_core::streaming::{StreamRequest, StreamableResource};
use sonora_core::{TrackRecord, TrackResolver};
use tracing::debug;

use crate::error::ApiError;
use crate::server::AppState;
use crate::streaming::ChannelSink;

/// Query parameters for streaming requests
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Content type override, either a full mime type or a file extension
    pub format: Option<String>,
}

/// Picks the `Content-Type` for a stream.
///
/// Order: explicit `format` (mime type, or extension looked up with
/// `mime_guess`), then the track's recorded type, then the configured default.
pub fn select_mime_type(
    format: Option<&str>,
    record: &TrackRecord,
    config: &StreamingConfig,
) -> String {
    if let Some(format) = format.map(str::trim).filter(|f| !f.is_empty()) {
        if format.contains('/') {
            return format.to_string();
        }
        if let Some(mime) = mime_guess::from_ext(format.trim_start_matches('.')).first() {
            return mime.essence_str().to_string();
        }
        debug!("Unknown format {:?}, falling back", format);
    }

    record
        .mime_type
        .clone()
        .unwrap_or_else(|| config.default_mime_type.clone())
}

/// `GET /tracks/{track_id}/stream`
///
/// # Errors
///
/// - `ApiError::InvalidTrackId` - Id segment is not a number (400)
/// - `ApiError::Catalog` - Unknown track id (404)
/// - `ApiError::Streaming` - Missing or unreadable file (404/500), unsatisfiable range (416)
/// - `ApiError::Internal` - The stream task panicked before sending headers
pub async fn stream_track(
    State(state): State<AppState>,
    track_id: Result<Path<u64>, PathRejection>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let Path(track_id) = track_id?;
    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let request = StreamRequest::from_header(track_id, range_header);

    let track = state.resolver.resolve(track_id).await?;
    let mime_type = select_mime_type(
        query.format.as_deref(),
        &track.record,
        state.streamer.config(),
    );
    let resource = StreamableResource::lookup(state.storage.clone(), &track, mime_type).await?;

    let (mut sink, pending) = ChannelSink::channel(state.streamer.config().channel_capacity);
    let streamer = state.streamer.clone();
    let task = tokio::spawn(async move {
        let outcome = streamer.serve(&request, &resource, &mut sink).await?;
        sink.finish();
        Ok::<_, sonora_core::StreamingError>(outcome)
    });

    if let Some(response) = pending.into_response().await {
        return Ok(response);
    }

    match task.await {
        Ok(Err(e)) => Err(e.into()),
        Ok(Ok(_)) => Err(ApiError::Internal {
            reason: "stream finished without a response head".to_string(),
        }),
        Err(e) => Err(ApiError::Internal {
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mime_type: Option<&str>) -> TrackRecord {
        TrackRecord {
            id: 1,
            name: "Shoot to Thrill".to_string(),
            album_name: "Back in Black".to_string(),
            artists: vec!["AC/DC".to_string()],
            mime_type: mime_type.map(str::to_string),
        }
    }

    #[test]
    fn test_select_mime_type_precedence() {
        let config = StreamingConfig::default();

        assert_eq!(
            select_mime_type(Some("audio/ogg"), &record(Some("audio/flac")), &config),
            "audio/ogg"
        );
        assert_eq!(
            select_mime_type(Some("mp3"), &record(Some("audio/flac")), &config),
            "audio/mpeg"
        );
        assert_eq!(
            select_mime_type(None, &record(Some("audio/flac")), &config),
            "audio/flac"
        );
        assert_eq!(select_mime_type(None, &record(None), &config), "audio/mpeg");
        assert_eq!(
            select_mime_type(Some("  "), &record(None), &config),
            "audio/mpeg"
        );
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        let config = StreamingConfig::default();
        assert_eq!(
            select_mime_type(Some("notaformat"), &record(Some("audio/wav")), &config),
            "audio/wav"
        );
    }
}
