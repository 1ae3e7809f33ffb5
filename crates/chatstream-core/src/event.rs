use serde::{Deserialize, Serialize};

/// Protocol events multiplexed onto a single streaming response.
///
/// A well-formed stream starts with exactly one [`Event::Connected`] and ends
/// with exactly one terminal event ([`Event::Done`] or [`Event::Error`]).
/// In between, text tokens and tool lifecycle events appear in the order the
/// agent produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The stream is open. Always first.
    Connected,

    /// An incremental fragment of assistant text.
    Token {
        /// The fragment, appended as-is.
        #[serde(rename = "token")]
        text: String,
    },

    /// A tool invocation has begun.
    ToolStart {
        /// Tool name.
        tool: String,
        /// Raw input payload, passed through unvalidated.
        #[serde(default)]
        input: serde_json::Value,
    },

    /// The most recently started tool invocation completed.
    ToolEnd {
        /// Tool name.
        tool: String,
        /// Raw output payload.
        #[serde(default)]
        output: serde_json::Value,
    },

    /// The agent run failed. Terminal.
    Error {
        /// Human-readable failure detail.
        #[serde(rename = "error")]
        message: String,
    },

    /// The agent run completed successfully. Terminal.
    Done,
}

impl Event {
    /// Creates a [`Event::Token`].
    pub fn token(text: impl Into<String>) -> Self {
        Self::Token { text: text.into() }
    }

    /// Creates a [`Event::Error`].
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns true if no further events may follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    /// Short name of the variant, matching its wire discriminant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Token { .. } => "token",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }
}
