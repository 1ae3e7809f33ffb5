//! Client side of a chatstream turn.
//!
//! Raw body chunks go through a [`FrameParser`], the resulting events are
//! folded by a [`MessageReconstructor`] into one rendered message, and
//! [`ChatSession`] ties both to an HTTP request and the message store.

/// One conversation against the streaming endpoint.
pub mod chat;
/// Incremental frame parsing of a response body.
pub mod parser;
/// Event fold into one assistant message.
pub mod reconstruct;
/// Text renderings of tool regions and failures.
pub mod render;

pub use chat::{ChatSession, TurnResult};
pub use parser::FrameParser;
pub use reconstruct::{Artifact, MessageReconstructor, Outcome, ReconstructState, Segment};
