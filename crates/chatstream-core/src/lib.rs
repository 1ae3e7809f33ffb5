//! Core types and error definitions for chatstream.
//!
//! This crate provides the pieces shared by both ends of a streaming chat turn:
//! the unified error type, conversation messages, the wire [`Event`] union, and
//! the frame codec that turns events into `text/event-stream` frames and back.
//!
//! # Main types
//!
//! - [`ChatStreamError`]: Unified error enum for all chatstream subsystems.
//! - [`ChatStreamResult`]: Convenience alias for `Result<T, ChatStreamError>`.
//! - [`Role`]: Conversation role (user, assistant).
//! - [`ChatMessage`]: One entry of the conversation history sent with each request.
//! - [`Event`]: A typed protocol message carried by exactly one frame.
//! - [`ChatRequest`]: The JSON body of a streaming request.

/// Frame encoding and splitting.
pub mod codec;
/// The wire event union.
pub mod event;

pub use codec::{decode, encode, split_frames, FRAME_DELIMITER, FRAME_PREFIX};
pub use event::Event;

use serde::{Deserialize, Serialize};

// --- Error types ---

/// Top-level error type for chatstream.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatStreamError {
    /// An error raised by the agent while producing its event feed.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error from an HTTP exchange (model backend or streaming endpoint).
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error from the message store.
    #[error("Session error: {0}")]
    Session(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the HTTP gateway layer, including a failed frame write.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A frame that does not follow the wire format.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatStreamError {
    /// The bare detail carried by this error, without the subsystem prefix.
    ///
    /// This is what an in-stream `Error` event reports to the client.
    pub fn message(&self) -> String {
        match self {
            Self::Agent(m)
            | Self::Http(m)
            | Self::Session(m)
            | Self::Config(m)
            | Self::Gateway(m)
            | Self::Protocol(m) => m.clone(),
            Self::Json(e) => e.to_string(),
            Self::Io(e) => e.to_string(),
        }
    }
}

/// A convenience `Result` alias using [`ChatStreamError`].
pub type ChatStreamResult<T> = Result<T, ChatStreamError>;

// --- Message types ---

/// The role of the participant that authored a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// The AI assistant.
    Assistant,
}

impl Role {
    /// Lowercase wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation entry as sent in a streaming request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a message with [`Role::User`].
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates a message with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat/stream`: the ordered history plus the conversation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Full ordered history, ending with the new user message.
    pub messages: Vec<ChatMessage>,
    /// Conversation identifier.
    pub chat_id: String,
}
