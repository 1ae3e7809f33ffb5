//! HTTP gateway for chatstream.
//!
//! `POST /api/chat/stream` runs the configured agent and streams its events
//! as `text/event-stream` frames; `GET /health` reports liveness.

/// HTTP handlers.
pub mod handler;
/// API key authentication.
pub mod middleware;
/// Agent events to frames.
pub mod multiplexer;
/// Router construction.
pub mod server;
/// Per-connection frame sinks.
pub mod sink;

pub use middleware::{AuthConfig, CallerIdentity};
pub use multiplexer::{EventMultiplexer, StreamOutcome};
pub use server::{GatewayConfig, GatewayServer};
pub use sink::{ChannelSink, FrameSink};
