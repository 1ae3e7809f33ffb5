//! Folds the ordered event sequence of one turn into a single rendered message.
//!
//! State machine: `Idle -> Streaming -> {Completed | Failed}`. The terminal
//! states are absorbing; events arriving after them are ignored. The only
//! side state besides the artifact is the pending tool call, so replaying the
//! same events through a fresh instance always yields the same result.

use crate::render::{
    empty_response_block, failure_block, format_value, tool_block, PROCESSING_MARKER,
};
use chatstream_core::Event;
use serde_json::Value;
use tracing::{debug, warn};

/// One piece of the rendered message.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// A run of streamed text.
    Text(String),
    /// A tool call. `output` is `None` while the call is in progress.
    Tool {
        /// Tool name.
        name: String,
        /// Input remembered from the start event.
        input: Value,
        /// Output from the end event.
        output: Option<Value>,
    },
}

impl Segment {
    fn render_into(&self, out: &mut String) {
        match self {
            Segment::Text(text) => out.push_str(text),
            Segment::Tool {
                name,
                input,
                output,
            } => {
                let output = output
                    .as_ref()
                    .map(format_value)
                    .unwrap_or_else(|| PROCESSING_MARKER.to_string());
                out.push_str(&tool_block(name, &format_value(input), &output));
            }
        }
    }
}

/// The message under construction, as an ordered list of segments.
///
/// Tool regions are addressed by index, so finalizing one never has to search
/// the rendered text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifact {
    segments: Vec<Segment>,
}

impl Artifact {
    /// Segments in display order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Append text, merging with a trailing text segment.
    pub fn push_text(&mut self, text: &str) {
        match self.segments.last_mut() {
            Some(Segment::Text(last)) => last.push_str(text),
            _ => self.segments.push(Segment::Text(text.to_string())),
        }
    }

    /// Append an in-progress tool region and return its index.
    pub fn open_region(&mut self, name: &str, input: Value) -> usize {
        self.segments.push(Segment::Tool {
            name: name.to_string(),
            input,
            output: None,
        });
        self.segments.len() - 1
    }

    /// Replace the region at `index` with its finished form.
    pub fn finalize_region(&mut self, index: usize, name: &str, input: Value, output: Value) {
        if let Some(segment) = self.segments.get_mut(index) {
            *segment = Segment::Tool {
                name: name.to_string(),
                input,
                output: Some(output),
            };
        }
    }

    /// Drop every segment.
    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// Flatten the segments into display text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            segment.render_into(&mut out);
        }
        out
    }
}

/// Where a [`MessageReconstructor`] is in its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconstructState {
    /// No event seen yet.
    Idle,
    /// Between the first event and the terminal one.
    Streaming,
    /// `Done` arrived. Absorbing.
    Completed,
    /// `Error` arrived or the turn was failed from outside. Absorbing.
    Failed,
}

/// How a turn ended, from the client's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `Done` with non-empty content; `content` is what gets persisted.
    Completed { content: String },
    /// `Done` with nothing to show; nothing is persisted.
    Empty { rendering: String },
    /// An `Error` event or a transport failure.
    Failed { message: String, rendering: String },
}

impl Outcome {
    /// What the presentation layer shows for this outcome.
    pub fn rendering(&self) -> &str {
        match self {
            Outcome::Completed { content } => content,
            Outcome::Empty { rendering } | Outcome::Failed { rendering, .. } => rendering,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingTool {
    region: usize,
    input: Value,
}

/// Folds the events of one turn into an [`Artifact`] and an [`Outcome`].
#[derive(Debug, Clone)]
pub struct MessageReconstructor {
    state: ReconstructState,
    artifact: Artifact,
    pending_tool: Option<PendingTool>,
    outcome: Option<Outcome>,
}

impl Default for MessageReconstructor {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageReconstructor {
    /// A reconstructor in [`ReconstructState::Idle`].
    pub fn new() -> Self {
        Self {
            state: ReconstructState::Idle,
            artifact: Artifact::default(),
            pending_tool: None,
            outcome: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReconstructState {
        self.state
    }

    /// The message built so far.
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// How the turn ended, once it has.
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// What should be on screen right now.
    pub fn rendered(&self) -> String {
        match &self.outcome {
            Some(outcome) => outcome.rendering().to_string(),
            None => self.artifact.render(),
        }
    }

    /// Apply one event. Returns the outcome when this event ends the turn.
    pub fn apply(&mut self, event: Event) -> Option<Outcome> {
        if self.is_terminal() {
            debug!(kind = event.kind(), "Ignoring event after terminal state");
            return None;
        }

        match event {
            Event::Connected => {
                if self.state == ReconstructState::Streaming {
                    warn!("Duplicate connected event");
                }
                self.state = ReconstructState::Streaming;
                None
            }
            Event::Token { text } => {
                self.begin_streaming();
                self.artifact.push_text(&text);
                None
            }
            Event::ToolStart { tool, input } => {
                self.begin_streaming();
                if self.pending_tool.is_some() {
                    warn!(tool = %tool, "Tool started while another is still open");
                }
                let region = self.artifact.open_region(&tool, input.clone());
                self.pending_tool = Some(PendingTool { region, input });
                None
            }
            Event::ToolEnd { tool, output } => {
                self.begin_streaming();
                match self.pending_tool.take() {
                    Some(pending) => {
                        self.artifact
                            .finalize_region(pending.region, &tool, pending.input, output);
                    }
                    None => warn!(tool = %tool, "Tool ended with no open tool call"),
                }
                None
            }
            Event::Error { message } => Some(self.fail(message)),
            Event::Done => Some(self.complete()),
        }
    }

    /// Fail the turn from outside the event stream (transport errors, a body
    /// that ends without a terminal event). A turn that already ended keeps
    /// its outcome.
    pub fn fail(&mut self, message: impl Into<String>) -> Outcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let message = message.into();
        self.artifact.clear();
        self.pending_tool = None;
        self.state = ReconstructState::Failed;
        let outcome = Outcome::Failed {
            rendering: failure_block(&message),
            message,
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    fn complete(&mut self) -> Outcome {
        self.state = ReconstructState::Completed;
        self.pending_tool = None;
        let content = self.artifact.render();
        let outcome = if content.trim().is_empty() {
            Outcome::Empty {
                rendering: empty_response_block(),
            }
        } else {
            Outcome::Completed { content }
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    fn begin_streaming(&mut self) {
        if self.state == ReconstructState::Idle {
            debug!("Event before connected; treating stream as open");
            self.state = ReconstructState::Streaming;
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ReconstructState::Completed | ReconstructState::Failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{EMPTY_RESPONSE_OUTPUT, FAILURE_INPUT};
    use serde_json::json;

    fn fold(events: Vec<Event>) -> (MessageReconstructor, Option<Outcome>) {
        let mut machine = MessageReconstructor::new();
        let mut last = None;
        for ev in events {
            if let Some(outcome) = machine.apply(ev) {
                last = Some(outcome);
            }
        }
        (machine, last)
    }

    #[test]
    fn tokens_concatenate_in_order() {
        let (machine, outcome) = fold(vec![
            Event::Connected,
            Event::token("Hello"),
            Event::token(" there"),
            Event::Done,
        ]);
        assert_eq!(
            outcome,
            Some(Outcome::Completed {
                content: "Hello there".into()
            })
        );
        assert_eq!(machine.state(), ReconstructState::Completed);
        assert_eq!(machine.rendered(), "Hello there");
    }

    #[test]
    fn tool_region_is_replaced_at_tool_end() {
        let mut machine = MessageReconstructor::new();
        machine.apply(Event::Connected);
        machine.apply(Event::ToolStart {
            tool: "search".into(),
            input: json!({"q": "x"}),
        });
        assert!(machine.rendered().contains(PROCESSING_MARKER));

        machine.apply(Event::ToolEnd {
            tool: "search".into(),
            output: json!({"r": "y"}),
        });
        machine.apply(Event::token("done"));
        let outcome = machine.apply(Event::Done).unwrap();

        let content = outcome.rendering();
        assert!(!content.contains(PROCESSING_MARKER));
        assert!(content.contains("\"q\": \"x\""));
        assert!(content.contains("\"r\": \"y\""));
        assert!(content.ends_with("done"));
        assert_eq!(
            machine.artifact().segments()[0],
            Segment::Tool {
                name: "search".into(),
                input: json!({"q": "x"}),
                output: Some(json!({"r": "y"})),
            }
        );
    }

    #[test]
    fn tokens_during_open_tool_follow_placeholder() {
        let (machine, _) = fold(vec![
            Event::Connected,
            Event::token("a"),
            Event::ToolStart {
                tool: "t".into(),
                input: json!("in"),
            },
            Event::token("b"),
            Event::ToolEnd {
                tool: "t".into(),
                output: json!("out"),
            },
        ]);
        let segments = machine.artifact().segments();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Segment::Text("a".into()));
        assert!(matches!(&segments[1], Segment::Tool { output: Some(_), .. }));
        assert_eq!(segments[2], Segment::Text("b".into()));
    }

    #[test]
    fn error_discards_artifact_and_renders_failure() {
        let (machine, outcome) = fold(vec![
            Event::Connected,
            Event::token("partial"),
            Event::error("boom"),
        ]);
        let outcome = outcome.unwrap();
        assert!(matches!(&outcome, Outcome::Failed { message, .. } if message == "boom"));
        assert!(outcome.rendering().contains(FAILURE_INPUT));
        assert!(!outcome.rendering().contains("partial"));
        assert!(machine.artifact().segments().is_empty());
        assert_eq!(machine.state(), ReconstructState::Failed);
    }

    #[test]
    fn empty_done_renders_no_response() {
        let (_, outcome) = fold(vec![Event::Connected, Event::token("  \n"), Event::Done]);
        let outcome = outcome.unwrap();
        assert!(matches!(outcome, Outcome::Empty { .. }));
        assert!(outcome.rendering().contains(EMPTY_RESPONSE_OUTPUT));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let mut machine = MessageReconstructor::new();
        machine.apply(Event::Connected);
        machine.apply(Event::token("x"));
        assert!(machine.apply(Event::Done).is_some());

        assert!(machine.apply(Event::token("late")).is_none());
        assert!(machine.apply(Event::error("late")).is_none());
        assert_eq!(machine.rendered(), "x");
        assert!(matches!(machine.fail("late"), Outcome::Completed { .. }));
    }

    #[test]
    fn tool_end_without_start_is_ignored() {
        let (machine, _) = fold(vec![
            Event::Connected,
            Event::ToolEnd {
                tool: "t".into(),
                output: json!(1),
            },
            Event::token("x"),
        ]);
        assert_eq!(machine.artifact().segments(), &[Segment::Text("x".into())]);
    }

    #[test]
    fn replay_is_deterministic() {
        let events = vec![
            Event::Connected,
            Event::token("Looking up. "),
            Event::ToolStart {
                tool: "search".into(),
                input: json!({"q": "rust"}),
            },
            Event::ToolEnd {
                tool: "search".into(),
                output: json!(["a", "b"]),
            },
            Event::token("Found two."),
            Event::Done,
        ];
        let (first, a) = fold(events.clone());
        let (second, b) = fold(events);
        assert_eq!(a, b);
        assert_eq!(first.artifact(), second.artifact());
    }

    #[test]
    fn idle_to_streaming_on_connected() {
        let mut machine = MessageReconstructor::new();
        assert_eq!(machine.state(), ReconstructState::Idle);
        machine.apply(Event::Connected);
        assert_eq!(machine.state(), ReconstructState::Streaming);
        assert!(machine.rendered().is_empty());
    }
}
