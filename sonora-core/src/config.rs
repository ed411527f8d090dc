//! Centralized configuration for Sonora.
//!
//! All tunable parameters are defined here and handed to each component
//! explicitly instead of being looked up from process-wide settings.

use std::path::PathBuf;

/// Default number of bytes written to the client per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Central configuration for all Sonora components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct SonoraConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    pub streaming: StreamingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind to
    pub host: String,
    /// TCP port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// Returns the `host:port` string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Location of stored track files.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding one file per track, named by storage key
    pub music_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            music_dir: PathBuf::from("storage/music"),
        }
    }
}

/// Location of the track catalog.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// JSON file containing the array of track records
    pub catalog_path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("storage/catalog.json"),
        }
    }
}

/// How ranges that fall outside the resource are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangePolicy {
    /// Clamp the end and fall back to the full resource when nothing is left.
    #[default]
    Lenient,
    /// Reject unsatisfiable ranges with `416 Range Not Satisfiable`.
    Strict,
}

impl std::str::FromStr for RangePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lenient" => Ok(RangePolicy::Lenient),
            "strict" => Ok(RangePolicy::Strict),
            _ => Err(format!("Invalid range policy: {s}")),
        }
    }
}

/// Byte-range streaming behaviour.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Upper bound on a single write to the client
    pub chunk_size: usize,
    /// Treatment of out-of-bounds ranges
    pub range_policy: RangePolicy,
    /// Content type used when neither the request nor the track names one
    pub default_mime_type: String,
    /// Number of chunks buffered between the reader and the HTTP body
    pub channel_capacity: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            range_policy: RangePolicy::Lenient,
            default_mime_type: "audio/mpeg".to_string(),
            channel_capacity: 4,
        }
    }
}

impl StreamingConfig {
    /// Chunk size actually used by the stream loop.
    ///
    /// Zero falls back to the default and larger values are capped at it, so
    /// no single write to the client exceeds [`DEFAULT_CHUNK_SIZE`].
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size.min(DEFAULT_CHUNK_SIZE)
        }
    }
}

impl SonoraConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Values that fail to parse are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("SONORA_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = std::env::var("SONORA_PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            config.server.port = port;
        }

        if let Ok(dir) = std::env::var("SONORA_MUSIC_DIR") {
            config.storage.music_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("SONORA_CATALOG") {
            config.catalog.catalog_path = PathBuf::from(path);
        }

        if let Ok(size) = std::env::var("SONORA_CHUNK_SIZE")
            && let Ok(size) = size.parse::<usize>()
            && (1..=DEFAULT_CHUNK_SIZE).contains(&size)
        {
            config.streaming.chunk_size = size;
        }

        if let Ok(policy) = std::env::var("SONORA_RANGE_POLICY")
            && let Ok(policy) = policy.parse::<RangePolicy>()
        {
            config.streaming.range_policy = policy;
        }

        config
    }

    /// Creates a configuration for tests rooted at the given paths.
    pub fn for_testing(music_dir: impl Into<PathBuf>, catalog_path: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            storage: StorageConfig {
                music_dir: music_dir.into(),
            },
            catalog: CatalogConfig {
                catalog_path: catalog_path.into(),
            },
            streaming: StreamingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = SonoraConfig::default();

        assert_eq!(config.server.bind_address(), "127.0.0.1:3000");
        assert_eq!(config.streaming.chunk_size, 16384);
        assert_eq!(config.streaming.range_policy, RangePolicy::Lenient);
        assert_eq!(config.streaming.default_mime_type, "audio/mpeg");
        assert_eq!(config.storage.music_dir, PathBuf::from("storage/music"));
    }

    #[test]
    fn test_range_policy_parsing() {
        assert_eq!("strict".parse::<RangePolicy>(), Ok(RangePolicy::Strict));
        assert_eq!("Lenient".parse::<RangePolicy>(), Ok(RangePolicy::Lenient));
        assert!("loose".parse::<RangePolicy>().is_err());
    }

    #[test]
    fn test_zero_chunk_size_falls_back() {
        let streaming = StreamingConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert_eq!(streaming.effective_chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_chunk_size_is_capped() {
        let mut streaming = StreamingConfig {
            chunk_size: 64 * 1024,
            ..Default::default()
        };
        assert_eq!(streaming.effective_chunk_size(), DEFAULT_CHUNK_SIZE);

        streaming.chunk_size = 512;
        assert_eq!(streaming.effective_chunk_size(), 512);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("SONORA_PORT", "8080");
            std::env::set_var("SONORA_MUSIC_DIR", "/srv/music");
            std::env::set_var("SONORA_CHUNK_SIZE", "65536");
            std::env::set_var("SONORA_RANGE_POLICY", "strict");
        }

        let config = SonoraConfig::from_env();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.music_dir, PathBuf::from("/srv/music"));
        assert_eq!(config.streaming.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.streaming.range_policy, RangePolicy::Strict);

        // Cleanup
        unsafe {
            std::env::remove_var("SONORA_PORT");
            std::env::remove_var("SONORA_MUSIC_DIR");
            std::env::remove_var("SONORA_CHUNK_SIZE");
            std::env::remove_var("SONORA_RANGE_POLICY");
        }
    }
}
