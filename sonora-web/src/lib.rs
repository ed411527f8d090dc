//! Sonora Web - track streaming server
//!
//! Serves stored tracks over HTTP with byte-range support, plus read-only
//! JSON endpoints describing the catalog.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]

pub mod error;
pub mod handlers;
pub mod server;
pub mod streaming;

// Re-export main types
pub use error::ApiError;
pub use server::{AppState, build_router, run_server, serve};
