//! CLI command implementations

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use sonora_core::catalog::storage_key;
use sonora_core::config::{RangePolicy, SonoraConfig};
use sonora_core::{TrackCatalog, TrackRecord};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Server {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory holding the stored track files
        #[arg(long)]
        music_dir: Option<PathBuf>,
        /// JSON file with the track catalog
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Reject ranges that start past the end of a track with 416
        #[arg(long)]
        strict_ranges: bool,
    },
    /// List catalog tracks with their storage keys
    Tracks {
        /// JSON file with the track catalog
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Print the storage key for a track
    StorageKey {
        /// First artist of the track
        #[arg(long)]
        artist: String,
        /// Album name
        #[arg(long, default_value = "")]
        album: String,
        /// Track title
        #[arg(long)]
        name: String,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of the command that failed
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Server {
            host,
            port,
            music_dir,
            catalog,
            strict_ranges,
        } => {
            let mut config = SonoraConfig::from_env();
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(music_dir) = music_dir {
                config.storage.music_dir = music_dir;
            }
            if let Some(catalog) = catalog {
                config.catalog.catalog_path = catalog;
            }
            if strict_ranges {
                config.streaming.range_policy = RangePolicy::Strict;
            }
            start_server(config).await
        }
        Commands::Tracks { catalog } => list_tracks(catalog).await,
        Commands::StorageKey {
            artist,
            album,
            name,
        } => {
            print_storage_key(artist, album, name);
            Ok(())
        }
    }
}

/// Start the streaming server
///
/// # Errors
/// - `SonoraError::Catalog` - Catalog file missing or malformed
/// - `SonoraError::Io` - Listener could not be bound
pub async fn start_server(config: SonoraConfig) -> anyhow::Result<()> {
    info!(
        "Starting Sonora on {} with catalog {}",
        config.server.bind_address(),
        config.catalog.catalog_path.display()
    );
    sonora_web::run_server(config).await?;
    Ok(())
}

/// Print every catalog track with the key its audio is stored under
///
/// # Errors
/// - `CatalogError` - Catalog file missing or malformed
pub async fn list_tracks(catalog: Option<PathBuf>) -> anyhow::Result<()> {
    let path = catalog.unwrap_or_else(|| SonoraConfig::from_env().catalog.catalog_path);
    let catalog = TrackCatalog::load(&path)
        .await
        .with_context(|| format!("loading catalog {}", path.display()))?;

    if catalog.is_empty() {
        println!("No tracks in {}", path.display());
        return Ok(());
    }

    println!("{:>6}  {:<32}  Title", "ID", "Storage key");
    for track in catalog.tracks() {
        println!(
            "{:>6}  {:<32}  {} - {}",
            track.id,
            storage_key(track),
            track.artists.first().map(String::as_str).unwrap_or("Unknown"),
            track.name
        );
    }

    Ok(())
}

/// Print the storage key derived from artist, album and title
pub fn print_storage_key(artist: String, album: String, name: String) {
    let record = TrackRecord {
        id: 0,
        name,
        album_name: album,
        artists: vec![artist],
        mime_type: None,
    };
    println!("{}", storage_key(&record));
}
