//! JSON API handlers

use axum::Json;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use serde::Serialize;
use serde_json::{Value, json};
use sonora_core::catalog::storage_key;
use sonora_core::streaming::http_date;
use sonora_core::{CatalogError, Storage, TrackRecord};
use tracing::debug;

use crate::error::ApiError;
use crate::server::AppState;

/// Track listing entry
#[derive(Debug, Serialize)]
pub struct TrackSummary {
    /// Catalog record
    #[serde(flatten)]
    pub record: TrackRecord,
    /// Key the audio file is stored under
    pub storage_key: String,
}

impl From<&TrackRecord> for TrackSummary {
    fn from(record: &TrackRecord) -> Self {
        Self {
            storage_key: storage_key(record).to_string(),
            record: record.clone(),
        }
    }
}

/// Single track with the state of its stored file
#[derive(Debug, Serialize)]
pub struct TrackDetails {
    /// Record and storage key
    #[serde(flatten)]
    pub summary: TrackSummary,
    /// Whether the audio file exists in storage
    pub stored: bool,
    /// Size of the stored file
    pub size_bytes: Option<u64>,
    /// HTTP date of the stored file's last modification
    pub last_modified: Option<String>,
}

/// `GET /api/tracks`
pub async fn api_tracks(State(state): State<AppState>) -> Json<Vec<TrackSummary>> {
    let tracks = state
        .catalog
        .tracks()
        .into_iter()
        .map(TrackSummary::from)
        .collect();
    Json(tracks)
}

/// `GET /api/tracks/{track_id}`
///
/// # Errors
///
/// - `ApiError::InvalidTrackId` - If the id segment is not a number
/// - `ApiError::Catalog` - If the track id is unknown
pub async fn api_track(
    State(state): State<AppState>,
    track_id: Result<Path<u64>, PathRejection>,
) -> Result<Json<TrackDetails>, ApiError> {
    let Path(track_id) = track_id?;
    let record = state
        .catalog
        .get(track_id)
        .ok_or(CatalogError::TrackNotFound { track_id })?;
    let summary = TrackSummary::from(record);

    let metadata = match state.storage.metadata(&storage_key(record)).await {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            debug!("No stored file for track {}: {}", track_id, e);
            None
        }
    };

    Ok(Json(TrackDetails {
        summary,
        stored: metadata.is_some(),
        size_bytes: metadata.as_ref().map(|m| m.size),
        last_modified: metadata.map(|m| http_date(m.last_modified)),
    }))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "tracks": state.catalog.len(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use sonora_core::SonoraConfig;
    use sonora_core::TrackCatalog;
    use sonora_core::storage::MemoryStorage;
    use tower::ServiceExt;

    use super::*;
    use crate::server::build_router;

    fn record(id: u64, name: &str) -> TrackRecord {
        TrackRecord {
            id,
            name: name.to_string(),
            album_name: "Blue Train".to_string(),
            artists: vec!["John Coltrane".to_string()],
            mime_type: None,
        }
    }

    fn app(storage: MemoryStorage) -> axum::Router {
        let catalog =
            TrackCatalog::from_records([record(2, "Moment's Notice"), record(1, "Blue Train")]);
        let config = SonoraConfig::for_testing("unused", "unused.json");
        build_router(AppState::new(config, catalog, Arc::new(storage)))
    }

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_tracks_listed_in_id_order() {
        let (status, body) = get_json(app(MemoryStorage::new()), "/api/tracks").await;

        assert_eq!(status, StatusCode::OK);
        let tracks = body.as_array().unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0]["id"], 1);
        assert_eq!(tracks[1]["name"], "Moment's Notice");
        assert_eq!(
            tracks[0]["storage_key"],
            storage_key(&record(1, "Blue Train")).to_string()
        );
    }

    #[tokio::test]
    async fn test_track_details_include_stored_size() {
        let storage = MemoryStorage::new();
        let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        storage
            .insert(storage_key(&record(1, "Blue Train")), vec![0u8; 640], modified)
            .await;

        let (status, body) = get_json(app(storage.clone()), "/api/tracks/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stored"], true);
        assert_eq!(body["size_bytes"], 640);
        assert_eq!(body["last_modified"], "Fri, 01 Mar 2024 12:00:00 GMT");

        let (status, body) = get_json(app(storage), "/api/tracks/2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stored"], false);
        assert!(body["size_bytes"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_track_is_not_found() {
        let (status, body) = get_json(app(MemoryStorage::new()), "/api/tracks/99").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn test_non_numeric_id_is_bad_request() {
        let (status, body) = get_json(app(MemoryStorage::new()), "/api/tracks/blue-train").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn test_health_reports_track_count() {
        let (status, body) = get_json(app(MemoryStorage::new()), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["tracks"], 2);
    }
}
