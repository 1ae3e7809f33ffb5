//! Translates an agent's native event feed into an ordered frame stream.
//!
//! The multiplexer owns the sink of one connection. It writes `Connected`
//! before the agent is invoked, one frame per classified native event, and
//! exactly one terminal frame, then closes the sink whatever happened.

use crate::sink::FrameSink;
use chatstream_agent::{Agent, AgentEvent};
use chatstream_core::{encode, ChatMessage, ChatStreamError, Event};
use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

/// Reported for a failure that carries no message of its own.
pub const FALLBACK_ERROR_MESSAGE: &str = "Stream processing failed";

/// Tool name used when the agent does not supply one.
pub const UNKNOWN_TOOL: &str = "unknown";

/// How a multiplexed stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The agent finished and `Done` was written.
    Completed,
    /// The agent failed and an `Error` frame carrying this message was written.
    Failed(String),
    /// Frames could no longer be written (client gone, or an event failed to encode).
    Aborted(String),
}

/// Why the pump loop stopped early.
enum Halt {
    Agent(ChatStreamError),
    Sink(ChatStreamError),
}

/// Drives one agent run onto one [`FrameSink`].
pub struct EventMultiplexer<S: FrameSink> {
    sink: S,
    chat_id: String,
    tokens_sent: bool,
    last_model_content: Option<String>,
    frames_written: usize,
}

impl<S: FrameSink> EventMultiplexer<S> {
    /// Wrap `sink` for the conversation `chat_id`.
    pub fn new(sink: S, chat_id: impl Into<String>) -> Self {
        Self {
            sink,
            chat_id: chat_id.into(),
            tokens_sent: false,
            last_model_content: None,
            frames_written: 0,
        }
    }

    /// Drive one agent run to its terminal event and release the sink.
    pub async fn run(mut self, agent: &dyn Agent, history: Vec<ChatMessage>) -> StreamOutcome {
        let outcome = self.drive(agent, history).await;

        if let Err(e) = self.sink.close().await {
            error!(chat_id = %self.chat_id, error = %e, "Failed to close frame sink");
        }

        info!(
            chat_id = %self.chat_id,
            frames = self.frames_written,
            outcome = ?outcome,
            "Stream finished"
        );
        outcome
    }

    async fn drive(&mut self, agent: &dyn Agent, history: Vec<ChatMessage>) -> StreamOutcome {
        if let Err(e) = self.emit(Event::Connected).await {
            return StreamOutcome::Aborted(e.message());
        }

        match self.pump(agent, history).await {
            Ok(()) => {
                if let Err(e) = self.finish().await {
                    return StreamOutcome::Aborted(e.message());
                }
                StreamOutcome::Completed
            }
            Err(Halt::Agent(e)) => {
                warn!(chat_id = %self.chat_id, error = %e, "Agent run failed");
                let mut message = e.message();
                if message.trim().is_empty() {
                    message = FALLBACK_ERROR_MESSAGE.to_string();
                }
                if let Err(e) = self.emit(Event::error(message.clone())).await {
                    return StreamOutcome::Aborted(e.message());
                }
                StreamOutcome::Failed(message)
            }
            Err(Halt::Sink(e)) => {
                warn!(chat_id = %self.chat_id, error = %e, "Stopped streaming");
                StreamOutcome::Aborted(e.message())
            }
        }
    }

    async fn pump(&mut self, agent: &dyn Agent, history: Vec<ChatMessage>) -> Result<(), Halt> {
        let mut events = agent
            .run(history, &self.chat_id)
            .await
            .map_err(Halt::Agent)?;

        while let Some(item) = events.next().await {
            let native = item.map_err(Halt::Agent)?;
            if let Some(event) = self.classify(native) {
                self.emit(event).await.map_err(Halt::Sink)?;
            }
        }
        Ok(())
    }

    /// Map a native event onto the protocol, updating fallback bookkeeping.
    fn classify(&mut self, native: AgentEvent) -> Option<Event> {
        match native {
            AgentEvent::ModelStream { text } => {
                if text.is_empty() {
                    return None;
                }
                self.tokens_sent = true;
                self.last_model_content = Some(text.clone());
                Some(Event::Token { text })
            }
            AgentEvent::ModelOutput { content } => {
                if !content.is_empty() {
                    self.last_model_content = Some(content);
                }
                None
            }
            AgentEvent::ToolStart { name, input } => {
                let tool = name.unwrap_or_else(|| UNKNOWN_TOOL.to_string());
                info!(chat_id = %self.chat_id, tool = %tool, "Tool started");
                Some(Event::ToolStart { tool, input })
            }
            AgentEvent::ToolEnd { name, output } => {
                let tool = name.unwrap_or_else(|| UNKNOWN_TOOL.to_string());
                info!(chat_id = %self.chat_id, tool = %tool, "Tool ended");
                Some(Event::ToolEnd { tool, output })
            }
            AgentEvent::Other { kind } => {
                debug!(chat_id = %self.chat_id, kind = %kind, "Ignoring native event");
                None
            }
        }
    }

    /// Fallback token for agents that buffer instead of stream, then `Done`.
    async fn finish(&mut self) -> Result<(), ChatStreamError> {
        if !self.tokens_sent {
            if let Some(content) = self.last_model_content.take() {
                debug!(chat_id = %self.chat_id, "Sending fallback token");
                self.emit(Event::Token { text: content }).await?;
            }
        }
        self.emit(Event::Done).await
    }

    async fn emit(&mut self, event: Event) -> Result<(), ChatStreamError> {
        let frame = encode(&event).inspect_err(|e| {
            error!(chat_id = %self.chat_id, kind = event.kind(), error = %e, "Failed to encode event");
        })?;
        debug!(chat_id = %self.chat_id, kind = event.kind(), "Writing frame");
        self.sink.write(frame).await?;
        self.frames_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatstream_agent::ScriptedAgent;
    use chatstream_core::{split_frames, ChatStreamResult};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Records frames; optionally refuses writes after `fail_after` frames.
    #[derive(Clone, Default)]
    struct RecordingSink {
        frames: Arc<Mutex<Vec<String>>>,
        closes: Arc<Mutex<usize>>,
        fail_after: Option<usize>,
        fail_close: bool,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<Event> {
            let joined: String = self.frames.lock().unwrap().concat();
            let (frames, rest) = split_frames(&joined);
            assert!(rest.is_empty());
            frames
                .into_iter()
                .map(|f| chatstream_core::decode(f).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn write(&mut self, frame: String) -> ChatStreamResult<()> {
            let mut frames = self.frames.lock().unwrap();
            if self.fail_after.is_some_and(|n| frames.len() >= n) {
                return Err(ChatStreamError::Gateway("client disconnected".into()));
            }
            frames.push(frame);
            Ok(())
        }

        async fn close(&mut self) -> ChatStreamResult<()> {
            *self.closes.lock().unwrap() += 1;
            if self.fail_close {
                return Err(ChatStreamError::Gateway("close failed".into()));
            }
            Ok(())
        }
    }

    async fn run_script(agent: ScriptedAgent) -> (StreamOutcome, RecordingSink) {
        let sink = RecordingSink::default();
        let outcome = EventMultiplexer::new(sink.clone(), "c1")
            .run(&agent, vec![ChatMessage::user("hi")])
            .await;
        (outcome, sink)
    }

    #[tokio::test]
    async fn tokens_are_framed_between_connected_and_done() {
        let (outcome, sink) = run_script(ScriptedAgent::streaming(&["Hello", " there"])).await;
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(
            sink.events(),
            vec![
                Event::Connected,
                Event::token("Hello"),
                Event::token(" there"),
                Event::Done
            ]
        );
        assert_eq!(*sink.closes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_increments_and_unknown_events_are_dropped() {
        let agent = ScriptedAgent::new()
            .token("")
            .event(AgentEvent::Other {
                kind: "on_chain_start".into(),
            })
            .token("x");
        let (_, sink) = run_script(agent).await;
        assert_eq!(
            sink.events(),
            vec![Event::Connected, Event::token("x"), Event::Done]
        );
    }

    #[tokio::test]
    async fn tool_events_pass_payloads_through() {
        let agent = ScriptedAgent::new()
            .tool_start("search", json!({"q": "x"}))
            .tool_end("search", json!({"r": "y"}))
            .event(AgentEvent::ToolStart {
                name: None,
                input: json!("raw"),
            })
            .event(AgentEvent::ToolEnd {
                name: None,
                output: json!(null),
            })
            .token("done");
        let (_, sink) = run_script(agent).await;
        let events = sink.events();
        assert_eq!(
            events[1],
            Event::ToolStart {
                tool: "search".into(),
                input: json!({"q": "x"})
            }
        );
        assert_eq!(
            events[2],
            Event::ToolEnd {
                tool: "search".into(),
                output: json!({"r": "y"})
            }
        );
        assert!(matches!(&events[3], Event::ToolStart { tool, .. } if tool == UNKNOWN_TOOL));
        assert!(matches!(&events[4], Event::ToolEnd { tool, .. } if tool == UNKNOWN_TOOL));
        assert_eq!(events[5], Event::token("done"));
    }

    #[tokio::test]
    async fn buffered_output_becomes_single_fallback_token() {
        let agent = ScriptedAgent::new().output("whole answer");
        let (outcome, sink) = run_script(agent).await;
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(
            sink.events(),
            vec![Event::Connected, Event::token("whole answer"), Event::Done]
        );
    }

    #[tokio::test]
    async fn no_fallback_when_tokens_were_streamed() {
        let agent = ScriptedAgent::new().token("a").output("a");
        let (_, sink) = run_script(agent).await;
        assert_eq!(
            sink.events(),
            vec![Event::Connected, Event::token("a"), Event::Done]
        );
    }

    #[tokio::test]
    async fn agent_failure_ends_with_single_error() {
        let agent = ScriptedAgent::new().token("partial").fail("boom").token("never");
        let (outcome, sink) = run_script(agent).await;
        assert_eq!(outcome, StreamOutcome::Failed("boom".into()));
        assert_eq!(
            sink.events(),
            vec![Event::Connected, Event::token("partial"), Event::error("boom")]
        );
        assert_eq!(*sink.closes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn messageless_failure_uses_fallback_text() {
        let (outcome, sink) = run_script(ScriptedAgent::new().fail("")).await;
        assert_eq!(outcome, StreamOutcome::Failed(FALLBACK_ERROR_MESSAGE.into()));
        assert_eq!(sink.events().last(), Some(&Event::error(FALLBACK_ERROR_MESSAGE)));
    }

    #[tokio::test]
    async fn refused_run_is_reported_in_stream_after_connected() {
        let (outcome, sink) = run_script(ScriptedAgent::new().refuse("no model")).await;
        assert_eq!(outcome, StreamOutcome::Failed("no model".into()));
        assert_eq!(
            sink.events(),
            vec![Event::Connected, Event::error("no model")]
        );
    }

    #[tokio::test]
    async fn disconnect_stops_consumption_and_still_closes() {
        let sink = RecordingSink {
            fail_after: Some(2),
            ..RecordingSink::default()
        };
        let agent = ScriptedAgent::streaming(&["a", "b", "c"]);
        let outcome = EventMultiplexer::new(sink.clone(), "c1")
            .run(&agent, vec![])
            .await;

        assert_eq!(outcome, StreamOutcome::Aborted("client disconnected".into()));
        assert_eq!(sink.frames.lock().unwrap().len(), 2);
        assert_eq!(*sink.closes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn close_failure_is_swallowed() {
        let sink = RecordingSink {
            fail_close: true,
            ..RecordingSink::default()
        };
        let outcome = EventMultiplexer::new(sink.clone(), "c1")
            .run(&ScriptedAgent::streaming(&["a"]), vec![])
            .await;
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(*sink.closes.lock().unwrap(), 1);
    }
}
