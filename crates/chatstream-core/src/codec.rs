//! `text/event-stream` framing for [`Event`]s.
//!
//! Wire format: `data: <json>\n\n`. A frame is complete only once its
//! trailing delimiter has been seen; anything after the last delimiter is a
//! partial frame that must wait for more input.

use crate::event::Event;
use crate::{ChatStreamError, ChatStreamResult};

/// Fixed prefix in front of every JSON payload.
pub const FRAME_PREFIX: &str = "data: ";

/// Terminates every frame.
pub const FRAME_DELIMITER: &str = "\n\n";

/// Encode one event as a complete frame.
///
/// A serialization failure here is an internal error, never a stream-level
/// `Error` event.
pub fn encode(event: &Event) -> ChatStreamResult<String> {
    let json = serde_json::to_string(event)?;
    Ok(format!("{FRAME_PREFIX}{json}{FRAME_DELIMITER}"))
}

/// Split `buffer` into the complete frames it holds and the trailing remainder.
///
/// The returned frames still carry their prefix but not their delimiter.
/// The remainder is empty when `buffer` ends exactly on a delimiter.
pub fn split_frames(buffer: &str) -> (Vec<&str>, &str) {
    let mut frames = Vec::new();
    let mut rest = buffer;
    while let Some(end) = rest.find(FRAME_DELIMITER) {
        frames.push(&rest[..end]);
        rest = &rest[end + FRAME_DELIMITER.len()..];
    }
    (frames, rest)
}

/// Decode a single frame (as returned by [`split_frames`]) into an event.
pub fn decode(frame: &str) -> ChatStreamResult<Event> {
    let payload = frame
        .trim_start_matches(['\r', '\n'])
        .strip_prefix(FRAME_PREFIX)
        .ok_or_else(|| {
            ChatStreamError::Protocol(format!("frame missing '{}' prefix", FRAME_PREFIX.trim()))
        })?;
    Ok(serde_json::from_str(payload.trim_end())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_wraps_json_in_prefix_and_delimiter() {
        let frame = encode(&Event::token("Hello")).unwrap();
        assert_eq!(frame, "data: {\"type\":\"token\",\"token\":\"Hello\"}\n\n");
    }

    #[test]
    fn split_keeps_partial_tail() {
        let (frames, rest) = split_frames("data: {\"type\":\"connected\"}\n\ndata: {\"ty");
        assert_eq!(frames, vec!["data: {\"type\":\"connected\"}"]);
        assert_eq!(rest, "data: {\"ty");
    }

    #[test]
    fn split_on_exact_boundary_leaves_nothing() {
        let input = format!(
            "{}{}",
            encode(&Event::Connected).unwrap(),
            encode(&Event::Done).unwrap()
        );
        let (frames, rest) = split_frames(&input);
        assert_eq!(frames.len(), 2);
        assert!(rest.is_empty());
    }

    #[test]
    fn split_without_delimiter_is_pure_buffering() {
        let (frames, rest) = split_frames("data: {\"type\":\"done\"}\n");
        assert!(frames.is_empty());
        assert_eq!(rest, "data: {\"type\":\"done\"}\n");
    }

    #[test]
    fn decode_round_trips_tool_start() {
        let ev = Event::ToolStart {
            tool: "search".into(),
            input: json!({"q": "x"}),
        };
        let frame = encode(&ev).unwrap();
        let (frames, _) = split_frames(&frame);
        assert_eq!(decode(frames[0]).unwrap(), ev);
    }

    #[test]
    fn decode_rejects_missing_prefix() {
        let err = decode("{\"type\":\"done\"}").unwrap_err();
        assert!(matches!(err, ChatStreamError::Protocol(_)));
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        assert!(decode("data: {\"type\":\"bogus\"}").is_err());
    }
}
