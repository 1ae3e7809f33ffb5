use crate::middleware::CallerIdentity;
use crate::multiplexer::EventMultiplexer;
use crate::server::AppState;
use crate::sink::ChannelSink;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chatstream_core::ChatRequest;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Body of the `500` returned when a request cannot be turned into a stream.
pub const REQUEST_FAILED_MESSAGE: &str = "Failed to process chat request";

/// `GET /health`.
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": "chatstream"}))
}

/// `POST /api/chat/stream`.
///
/// Anything that goes wrong before the response is built is reported with a
/// status code. Once the response exists, the agent run happens on its own
/// task and failures travel inside the stream.
pub async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerIdentity>,
    body: Bytes,
) -> Response {
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!(caller = %caller.0, error = %e, "Malformed chat request");
            return request_failed();
        }
    };

    let (sink, body) = ChannelSink::pair(state.stream_buffer);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CONNECTION, "keep-alive")
        .header(header::CACHE_CONTROL, "no-cache, no-transform")
        .header("X-Accel-Buffering", "no")
        .body(body);

    let response = match response {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "Failed to build stream response");
            return request_failed();
        }
    };

    info!(
        caller = %caller.0,
        chat_id = %request.chat_id,
        messages = request.messages.len(),
        "Opening chat stream"
    );

    let agent = state.agent.clone();
    tokio::spawn(async move {
        EventMultiplexer::new(sink, request.chat_id)
            .run(agent.as_ref(), request.messages)
            .await;
    });

    response
}

fn request_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": REQUEST_FAILED_MESSAGE })),
    )
        .into_response()
}
