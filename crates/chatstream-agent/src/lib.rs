//! The agent collaborator consumed by the chatstream gateway.
//!
//! An [`Agent`] turns a conversation history into a lazy stream of native
//! [`AgentEvent`]s. The gateway translates those into wire events; nothing in
//! this crate knows about framing.

/// The agent trait and its native event vocabulary.
pub mod agent;
/// Model backend settings.
pub mod config;
/// History window and default system prompt.
pub mod context;
/// Ollama chat backend.
pub mod ollama;
/// Agent that replays a fixed script.
pub mod scripted;

pub use agent::{Agent, AgentEvent, AgentEventStream};
pub use config::ModelConfig;
pub use context::{ContextWindow, DEFAULT_SYSTEM_PROMPT};
pub use ollama::OllamaAgent;
pub use scripted::ScriptedAgent;
