//! End-to-end streaming workflow test
//!
//! Writes a catalog and track files to disk, starts the server on an
//! ephemeral port and talks to it over real HTTP connections.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header;
use sonora_core::catalog::storage_key;
use sonora_core::config::SonoraConfig;
use sonora_core::{LocalStorage, TrackCatalog, TrackRecord};
use sonora_web::AppState;
use tempfile::TempDir;
use tokio::fs;
use tokio::net::TcpListener;

fn records() -> Vec<TrackRecord> {
    vec![
        TrackRecord {
            id: 11,
            name: "Windowlicker".to_string(),
            album_name: "Windowlicker".to_string(),
            artists: vec!["Aphex Twin".to_string()],
            mime_type: Some("audio/mpeg".to_string()),
        },
        TrackRecord {
            id: 12,
            name: "Roygbiv".to_string(),
            album_name: "Music Has the Right to Children".to_string(),
            artists: vec!["Boards of Canada".to_string()],
            mime_type: None,
        },
    ]
}

fn track_bytes(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 241) as u8).collect()
}

/// Writes the catalog and one file per track, sized by `sizes`.
async fn write_library(root: &Path, sizes: &[usize]) -> SonoraConfig {
    let music_dir = root.join("music");
    fs::create_dir_all(&music_dir).await.unwrap();

    let records = records();
    for (record, size) in records.iter().zip(sizes) {
        let path = music_dir.join(storage_key(record).as_str());
        fs::write(path, track_bytes(*size)).await.unwrap();
    }

    let catalog_path = root.join("catalog.json");
    fs::write(&catalog_path, serde_json::to_vec(&records).unwrap())
        .await
        .unwrap();

    SonoraConfig::for_testing(music_dir, catalog_path)
}

/// Starts the server the way `run_server` does and returns its address.
async fn start_server(config: SonoraConfig) -> SocketAddr {
    let catalog = TrackCatalog::load(&config.catalog.catalog_path)
        .await
        .unwrap();
    let storage = Arc::new(LocalStorage::new(config.storage.music_dir.clone()));
    let listener = TcpListener::bind(config.server.bind_address()).await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(sonora_web::serve(listener, AppState::new(config, catalog, storage)));
    addr
}

#[tokio::test]
async fn test_range_requests_over_http() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_library(temp_dir.path(), &[300_000, 10]).await;
    let addr = start_server(config).await;
    let client = reqwest::Client::new();
    let expected = track_bytes(300_000);

    let response = client
        .get(format!("http://{addr}/tracks/11/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.content_length(), Some(300_000));
    assert_eq!(response.bytes().await.unwrap().as_ref(), expected.as_slice());

    let response = client
        .get(format!("http://{addr}/tracks/11/stream"))
        .header(header::RANGE, "bytes=123456-223455")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE],
        "bytes 123456-223455/300000"
    );
    assert_eq!(
        response.bytes().await.unwrap().as_ref(),
        &expected[123_456..223_456]
    );

    let response = client
        .get(format!("http://{addr}/tracks/12/stream?format=ogg"))
        .header(header::RANGE, "bytes=4-")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/ogg");
    assert_eq!(response.bytes().await.unwrap().as_ref(), &track_bytes(10)[4..]);
}

#[tokio::test]
async fn test_catalog_endpoints_reflect_disk() {
    let temp_dir = TempDir::new().unwrap();
    // Only the first track has a file on disk
    let config = write_library(temp_dir.path(), &[2048]).await;
    let addr = start_server(config).await;
    let client = reqwest::Client::new();

    let tracks: serde_json::Value = client
        .get(format!("http://{addr}/api/tracks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tracks.as_array().unwrap().len(), 2);

    let stored: serde_json::Value = client
        .get(format!("http://{addr}/api/tracks/11"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["size_bytes"], 2048);

    let response = client
        .get(format!("http://{addr}/tracks/12/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_abandoned_download_does_not_block_server() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_library(temp_dir.path(), &[8 * 1024 * 1024, 10]).await;
    let addr = start_server(config).await;
    let client = reqwest::Client::new();

    // Read a single chunk of a large track, then hang up
    let mut response = client
        .get(format!("http://{addr}/tracks/11/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = response.chunk().await.unwrap().unwrap();
    assert!(!first.is_empty());
    drop(response);

    let health: serde_json::Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let response = client
        .get(format!("http://{addr}/tracks/12/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.bytes().await.unwrap().as_ref(), track_bytes(10).as_slice());
}
