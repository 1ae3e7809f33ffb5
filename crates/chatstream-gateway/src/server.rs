use crate::handler::{chat_stream_handler, health_handler};
use crate::middleware::{auth_middleware, AuthConfig};
use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use chatstream_agent::Agent;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    /// Agent serving every request.
    pub agent: Arc<dyn Agent>,
    /// Frames that may queue per connection before the multiplexer waits.
    pub stream_buffer: usize,
}

/// Settings for [`GatewayServer::build_with_config`].
#[derive(Clone)]
pub struct GatewayConfig {
    /// Who may open a stream.
    pub auth: AuthConfig,
    /// Per-connection frame queue; see [`AppState::stream_buffer`].
    pub stream_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            stream_buffer: 1024,
        }
    }
}

impl GatewayConfig {
    /// Default settings with anonymous callers admitted.
    pub fn open() -> Self {
        Self {
            auth: AuthConfig::open(),
            ..Self::default()
        }
    }
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway; the streaming route sits behind the auth middleware,
    /// `/health` does not.
    pub fn build_with_config(agent: Arc<dyn Agent>, config: GatewayConfig) -> Router {
        let state = Arc::new(AppState {
            agent,
            stream_buffer: config.stream_buffer,
        });
        let auth = Arc::new(config.auth);

        let api = Router::new()
            .route("/api/chat/stream", post(chat_stream_handler))
            .route_layer(axum_mw::from_fn_with_state(auth, auth_middleware))
            .with_state(state);

        Router::new()
            .route("/health", get(health_handler))
            .merge(api)
    }
}
