//! Bridges the core streamer to hyper response bodies.

pub mod channel_sink;

pub use channel_sink::{ChannelSink, PendingResponse, ResponseHead};
