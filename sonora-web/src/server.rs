//! HTTP server for Sonora
//!
//! Wires the catalog, storage and streamer into an axum router. All
//! collaborators are passed in through [`AppState`]; nothing is looked up
//! from global state.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use sonora_core::config::SonoraConfig;
use sonora_core::{LocalStorage, RangeStreamer, Storage, TrackCatalog, TrackResolver};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{api_track, api_tracks, health, stream_track};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Configuration the server was started with
    pub config: Arc<SonoraConfig>,
    /// Catalog used for listings
    pub catalog: Arc<TrackCatalog>,
    /// Track id to storage key lookup used by the stream endpoint
    pub resolver: Arc<dyn TrackResolver>,
    /// Stored track files
    pub storage: Arc<dyn Storage>,
    /// Range streamer configured from `config.streaming`
    pub streamer: Arc<RangeStreamer>,
}

impl AppState {
    /// Builds state where the catalog also acts as the resolver.
    pub fn new(config: SonoraConfig, catalog: TrackCatalog, storage: Arc<dyn Storage>) -> Self {
        let catalog = Arc::new(catalog);
        let streamer = Arc::new(RangeStreamer::new(config.streaming.clone()));

        Self {
            config: Arc::new(config),
            resolver: catalog.clone(),
            catalog,
            storage,
            streamer,
        }
    }
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/tracks/{track_id}/stream", get(stream_track))
        .route("/api/tracks", get(api_tracks))
        .route("/api/tracks/{track_id}", get(api_track))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the application on an already bound listener until it fails.
///
/// # Errors
///
/// - `std::io::Error` - If accepting connections fails
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, build_router(state)).await
}

/// Loads the catalog, opens local storage and runs the server.
///
/// # Errors
///
/// - `SonoraError::Catalog` - If the catalog file cannot be read or parsed
/// - `SonoraError::Io` - If the listener cannot be bound
pub async fn run_server(config: SonoraConfig) -> sonora_core::Result<()> {
    let catalog = TrackCatalog::load(&config.catalog.catalog_path).await?;
    let storage = Arc::new(LocalStorage::new(config.storage.music_dir.clone()));

    info!(
        "Serving {} tracks from {} (range policy {:?}, chunk size {})",
        catalog.len(),
        storage.root().display(),
        config.streaming.range_policy,
        config.streaming.effective_chunk_size()
    );

    let bind_address = config.server.bind_address();
    let state = AppState::new(config, catalog, storage);

    let listener = TcpListener::bind(&bind_address).await?;
    info!("Sonora streaming server running on http://{}", listener.local_addr()?);
    serve(listener, state).await?;
    Ok(())
}
