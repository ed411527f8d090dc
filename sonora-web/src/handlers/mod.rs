//! HTTP request handlers organized by functionality

pub mod api;
pub mod streaming;

// Re-export handler functions
pub use api::{TrackDetails, TrackSummary, api_track, api_tracks, health};
pub use streaming::{StreamQuery, select_mime_type, stream_track};
