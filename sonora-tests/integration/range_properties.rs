//! Property tests for range requests served through the router

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use proptest::prelude::*;
use sonora_core::catalog::storage_key;
use sonora_core::config::SonoraConfig;
use sonora_core::storage::MemoryStorage;
use sonora_core::{TrackCatalog, TrackRecord};
use sonora_web::{AppState, build_router};
use tower::ServiceExt;

fn record() -> TrackRecord {
    TrackRecord {
        id: 1,
        name: "Teardrop".to_string(),
        album_name: "Mezzanine".to_string(),
        artists: vec!["Massive Attack".to_string()],
        mime_type: Some("audio/mpeg".to_string()),
    }
}

/// Fetches `range` from a track of `size` bytes.
///
/// Returns status, Content-Length, body and the full track content.
fn fetch(size: usize, chunk_size: usize, range: &str) -> (StatusCode, u64, Vec<u8>, Vec<u8>) {
    let data: Vec<u8> = (0..size).map(|i| (i * 7 % 256) as u8).collect();
    let mut config = SonoraConfig::for_testing("unused", "unused.json");
    config.streaming.chunk_size = chunk_size;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let storage = MemoryStorage::new();
        storage
            .insert(storage_key(&record()), data.clone(), Utc::now())
            .await;
        let router = build_router(AppState::new(
            config,
            TrackCatalog::from_records([record()]),
            Arc::new(storage),
        ));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/tracks/1/stream")
                    .header(header::RANGE, range)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let content_length = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, content_length, body, data)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn body_matches_requested_window(
        size in 1usize..20_000,
        chunk_size in 1usize..4096,
        start in 0usize..20_000,
        len in 1usize..20_000,
    ) {
        let start = start % size;
        let end = start + len - 1;
        let (status, content_length, body, data) =
            fetch(size, chunk_size, &format!("bytes={start}-{end}"));

        let last = end.min(size - 1);
        prop_assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        prop_assert_eq!(content_length, (last - start + 1) as u64);
        prop_assert_eq!(body.len() as u64, content_length);
        prop_assert_eq!(&body[..], &data[start..=last]);
    }

    #[test]
    fn open_ended_range_reaches_last_byte(
        size in 1usize..20_000,
        start in 0usize..20_000,
    ) {
        let start = start % size;
        let (status, content_length, body, data) =
            fetch(size, 1024, &format!("bytes={start}-"));

        prop_assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        prop_assert_eq!(content_length, (size - start) as u64);
        prop_assert_eq!(&body[..], &data[start..]);
    }
}
