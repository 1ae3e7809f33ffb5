use crate::agent::{Agent, AgentEvent, AgentEventStream};
use async_trait::async_trait;
use chatstream_core::{ChatMessage, ChatStreamError, ChatStreamResult};
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tracing::debug;

/// One step of a scripted run.
#[derive(Debug, Clone)]
enum Step {
    Event(AgentEvent),
    Fail(String),
}

/// Agent that replays a fixed script of native events.
///
/// Every call to [`Agent::run`] replays the same script. The histories it was
/// called with are recorded so callers can inspect what the agent saw.
#[derive(Default)]
pub struct ScriptedAgent {
    steps: Vec<Step>,
    refuse: Option<String>,
    calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedAgent {
    /// An empty script: every run completes with no events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replays `text` as a sequence of streamed tokens.
    pub fn streaming(tokens: &[&str]) -> Self {
        tokens.iter().fold(Self::new(), |agent, t| agent.token(*t))
    }

    /// Append a streamed increment.
    pub fn token(self, text: impl Into<String>) -> Self {
        self.event(AgentEvent::ModelStream { text: text.into() })
    }

    /// Append non-streamed model output.
    pub fn output(self, content: impl Into<String>) -> Self {
        self.event(AgentEvent::ModelOutput {
            content: content.into(),
        })
    }

    /// Append the start of a tool call.
    pub fn tool_start(self, name: impl Into<String>, input: serde_json::Value) -> Self {
        self.event(AgentEvent::ToolStart {
            name: Some(name.into()),
            input,
        })
    }

    /// Append the end of a tool call.
    pub fn tool_end(self, name: impl Into<String>, output: serde_json::Value) -> Self {
        self.event(AgentEvent::ToolEnd {
            name: Some(name.into()),
            output,
        })
    }

    /// Append any native event.
    pub fn event(mut self, event: AgentEvent) -> Self {
        self.steps.push(Step::Event(event));
        self
    }

    /// Fails the run at this point of the script.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(Step::Fail(message.into()));
        self
    }

    /// Makes `run` itself fail before any event is produced.
    pub fn refuse(mut self, message: impl Into<String>) -> Self {
        self.refuse = Some(message.into());
        self
    }

    /// `(chat_id, history)` for every run so far.
    pub fn calls(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn run(
        &self,
        history: Vec<ChatMessage>,
        chat_id: &str,
    ) -> ChatStreamResult<AgentEventStream> {
        self.calls.lock().push((chat_id.to_string(), history));

        if let Some(message) = &self.refuse {
            return Err(ChatStreamError::Agent(message.clone()));
        }

        debug!(chat_id = %chat_id, steps = self.steps.len(), "Replaying scripted run");

        let items: Vec<ChatStreamResult<AgentEvent>> = self
            .steps
            .iter()
            .map(|step| match step {
                Step::Event(ev) => Ok(ev.clone()),
                Step::Fail(msg) => Err(ChatStreamError::Agent(msg.clone())),
            })
            .collect();

        Ok(stream::iter(items).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_script_and_records_calls() {
        let agent = ScriptedAgent::streaming(&["a", "b"]).fail("boom");
        let items: Vec<_> = agent
            .run(vec![ChatMessage::user("hi")], "c1")
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], Ok(AgentEvent::ModelStream { text }) if text == "a"));
        assert!(items[2].is_err());

        let calls = agent.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "c1");
    }

    #[tokio::test]
    async fn refusing_agent_fails_before_streaming() {
        let agent = ScriptedAgent::new().refuse("no model");
        assert!(agent.run(vec![], "c1").await.is_err());
    }
}
