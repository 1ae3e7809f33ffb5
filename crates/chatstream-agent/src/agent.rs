use async_trait::async_trait;
use chatstream_core::{ChatMessage, ChatStreamResult};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Native events produced by an agent run.
///
/// These are the agent's own vocabulary. The gateway classifies them into
/// protocol events and ignores anything it does not recognise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    /// An incremental piece of streamed model output. May be empty.
    ModelStream { text: String },

    /// Non-streamed model output, e.g. the final answer of a model that
    /// buffers instead of streaming.
    ModelOutput { content: String },

    /// A tool invocation has begun.
    ToolStart {
        name: Option<String>,
        input: serde_json::Value,
    },

    /// The most recent tool invocation finished.
    ToolEnd {
        name: Option<String>,
        output: serde_json::Value,
    },

    /// Anything else the agent reports (chain starts, graph steps, ...).
    Other { kind: String },
}

/// A lazy, fallible sequence of native events. An `Err` item ends the run.
pub type AgentEventStream = BoxStream<'static, ChatStreamResult<AgentEvent>>;

/// The agent collaborator.
///
/// `run` receives the full ordered history (ending with the newest user
/// message) and the conversation id, and returns a stream that the caller
/// drives to completion from a single task.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Start a run and return its event feed.
    async fn run(
        &self,
        history: Vec<ChatMessage>,
        chat_id: &str,
    ) -> ChatStreamResult<AgentEventStream>;
}
