//! Integration tests for Sonora
//!
//! These tests drive the streaming endpoint through the full router, with
//! tracks held in memory or on disk, and check the HTTP contract clients
//! rely on: status codes, range headers and exact body bytes.

#[path = "integration/stream_endpoint.rs"]
mod stream_endpoint;

#[path = "integration/storage_failures.rs"]
mod storage_failures;

#[path = "integration/range_properties.rs"]
mod range_properties;

#[path = "e2e/mod.rs"]
mod e2e;
