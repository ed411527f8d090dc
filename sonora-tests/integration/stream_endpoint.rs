//! Integration tests for the track stream endpoint
//!
//! Requests go through the real router with tracks held in memory, so every
//! scenario checks the exact status, headers and body a client receives.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use chrono::{TimeZone, Utc};
use sonora_core::catalog::storage_key;
use sonora_core::config::{RangePolicy, SonoraConfig};
use sonora_core::storage::MemoryStorage;
use sonora_core::{TrackCatalog, TrackRecord};
use sonora_web::{AppState, build_router};
use tower::ServiceExt;

const TRACK_SIZE: usize = 1000;

fn track(id: u64, name: &str, mime_type: Option<&str>) -> TrackRecord {
    TrackRecord {
        id,
        name: name.to_string(),
        album_name: "Kind of Blue".to_string(),
        artists: vec!["Miles Davis".to_string()],
        mime_type: mime_type.map(str::to_string),
    }
}

/// Deterministic track content where every byte encodes its offset.
fn track_bytes(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

struct TestApp {
    router: Router,
    storage: MemoryStorage,
}

impl TestApp {
    async fn new(policy: RangePolicy) -> Self {
        let storage = MemoryStorage::new();
        let modified = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();

        let stored = track(1, "So What", Some("audio/mpeg"));
        storage
            .insert(storage_key(&stored), track_bytes(TRACK_SIZE), modified)
            .await;

        let empty = track(3, "Silence", None);
        storage
            .insert(storage_key(&empty), Vec::<u8>::new(), modified)
            .await;

        // Track 2 is catalogued but its file was never stored
        let catalog = TrackCatalog::from_records([
            stored,
            track(2, "Freddie Freeloader", None),
            empty,
        ]);

        let mut config = SonoraConfig::for_testing("unused", "unused.json");
        config.streaming.range_policy = policy;
        config.streaming.chunk_size = 128;

        let router = build_router(AppState::new(config, catalog, Arc::new(storage.clone())));
        Self { router, storage }
    }

    async fn get(&self, uri: &str, range: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(range) = range {
            request = request.header(header::RANGE, range);
        }
        self.router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

fn header_value<'a>(response: &'a Response<Body>, name: header::HeaderName) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn test_full_track_without_range() {
    let app = TestApp::new(RangePolicy::Lenient).await;
    let response = app.get("/tracks/1/stream", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("1000"));
    assert_eq!(header_value(&response, header::CONTENT_TYPE), Some("audio/mpeg"));
    assert_eq!(header_value(&response, header::ACCEPT_RANGES), Some("bytes"));
    assert_eq!(header_value(&response, header::CONTENT_RANGE), None);
    assert_eq!(
        header_value(&response, header::LAST_MODIFIED),
        Some("Wed, 21 Oct 2015 07:28:00 GMT")
    );
    assert_eq!(
        header_value(&response, header::CONTENT_DISPOSITION),
        Some("inline; filename=\"So What\"")
    );

    assert_eq!(body_bytes(response).await, track_bytes(TRACK_SIZE));
}

#[tokio::test]
async fn test_bounded_range_returns_exact_window() {
    let app = TestApp::new(RangePolicy::Lenient).await;
    let response = app.get("/tracks/1/stream", Some("bytes=500-599")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("100"));
    assert_eq!(
        header_value(&response, header::CONTENT_RANGE),
        Some("bytes 500-599/1000")
    );
    assert_eq!(body_bytes(response).await, track_bytes(TRACK_SIZE)[500..600]);
}

#[tokio::test]
async fn test_open_ended_range_runs_to_last_byte() {
    let app = TestApp::new(RangePolicy::Lenient).await;
    let response = app.get("/tracks/1/stream", Some("bytes=900-")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_value(&response, header::CONTENT_RANGE),
        Some("bytes 900-999/1000")
    );
    assert_eq!(body_bytes(response).await, track_bytes(TRACK_SIZE)[900..]);
}

#[tokio::test]
async fn test_range_end_is_clamped_to_track() {
    let app = TestApp::new(RangePolicy::Lenient).await;
    let response = app.get("/tracks/1/stream", Some("bytes=990-5000")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("10"));
    assert_eq!(
        header_value(&response, header::CONTENT_RANGE),
        Some("bytes 990-999/1000")
    );
    assert_eq!(body_bytes(response).await.len(), 10);
}

#[tokio::test]
async fn test_malformed_range_serves_full_track() {
    let app = TestApp::new(RangePolicy::Strict).await;

    for range in ["items=0-10", "bytes=-500", "bytes=abc-def", "bytes=600-100"] {
        let response = app.get("/tracks/1/stream", Some(range)).await;
        assert_eq!(response.status(), StatusCode::OK, "range {range:?}");
        assert_eq!(body_bytes(response).await.len(), TRACK_SIZE);
    }
}

#[tokio::test]
async fn test_range_past_end_depends_on_policy() {
    let lenient = TestApp::new(RangePolicy::Lenient).await;
    let response = lenient.get("/tracks/1/stream", Some("bytes=5000-")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.len(), TRACK_SIZE);

    let strict = TestApp::new(RangePolicy::Strict).await;
    let response = strict.get("/tracks/1/stream", Some("bytes=5000-")).await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        header_value(&response, header::CONTENT_RANGE),
        Some("bytes */1000")
    );
}

#[tokio::test]
async fn test_unknown_track_is_not_found() {
    let app = TestApp::new(RangePolicy::Lenient).await;
    let response = app.get("/tracks/42/stream", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let app = TestApp::new(RangePolicy::Lenient).await;
    let response = app.get("/tracks/2/stream", Some("bytes=0-10")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_value(&response, header::CONTENT_RANGE), None);
}

#[tokio::test]
async fn test_removed_file_is_not_found() {
    let app = TestApp::new(RangePolicy::Lenient).await;
    app.storage
        .remove(&storage_key(&track(1, "So What", None)))
        .await;

    let response = app.get("/tracks/1/stream", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_track_id_is_rejected() {
    let app = TestApp::new(RangePolicy::Lenient).await;
    let response = app.get("/tracks/not-a-number/stream", None).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], 400);
    assert!(body["error"].as_str().unwrap().contains("Invalid track id"));
}

#[tokio::test]
async fn test_empty_track_has_empty_body() {
    let app = TestApp::new(RangePolicy::Lenient).await;
    let response = app.get("/tracks/3/stream", Some("bytes=0-")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, header::CONTENT_LENGTH), Some("0"));
    assert_eq!(
        header_value(&response, header::CONTENT_TYPE),
        Some("audio/mpeg")
    );
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_format_overrides_content_type() {
    let app = TestApp::new(RangePolicy::Lenient).await;

    let response = app.get("/tracks/1/stream?format=audio/ogg", None).await;
    assert_eq!(header_value(&response, header::CONTENT_TYPE), Some("audio/ogg"));

    let response = app.get("/tracks/1/stream?format=flac", None).await;
    assert_eq!(
        header_value(&response, header::CONTENT_TYPE),
        Some("audio/flac")
    );
}

#[tokio::test]
async fn test_concurrent_streams_are_independent() {
    let app = Arc::new(TestApp::new(RangePolicy::Lenient).await);

    let requests = (0..8u64).map(|i| {
        let app = app.clone();
        tokio::spawn(async move {
            let start = i * 100;
            let range = format!("bytes={start}-{}", start + 49);
            let response = app.get("/tracks/1/stream", Some(&range)).await;
            assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
            (start as usize, body_bytes(response).await)
        })
    });

    let expected = track_bytes(TRACK_SIZE);
    for request in requests.collect::<Vec<_>>() {
        let (start, body) = request.await.unwrap();
        assert_eq!(body, expected[start..start + 50]);
    }
}
