use chatstream_core::{decode, split_frames, Event};
use tracing::warn;

/// Incremental parser for one response body.
///
/// Fragments must be fed in arrival order from a single task. Complete frames
/// are decoded and returned exactly once; a trailing partial frame stays
/// buffered until a later fragment completes it. A frame that fails to decode
/// is skipped without affecting the frames around it.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: String,
    /// Bytes of a UTF-8 sequence cut off at the end of the last chunk.
    partial_utf8: Vec<u8>,
    skipped: usize,
}

impl FrameParser {
    /// A parser with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a text fragment and return the events it completed.
    pub fn parse(&mut self, fragment: &str) -> Vec<Event> {
        if fragment.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(fragment);
        self.drain_frames()
    }

    /// Feed raw body bytes. A multi-byte character split across chunks is
    /// held back until its remaining bytes arrive.
    pub fn parse_bytes(&mut self, chunk: &[u8]) -> Vec<Event> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.partial_utf8.extend_from_slice(chunk);
        let text = take_utf8(&mut self.partial_utf8);
        self.parse(&text)
    }

    /// Text received but not yet part of a complete frame.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Number of frames dropped because they could not be decoded.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn drain_frames(&mut self) -> Vec<Event> {
        let (frames, rest) = split_frames(&self.buffer);
        let consumed = self.buffer.len() - rest.len();

        let mut events = Vec::with_capacity(frames.len());
        let mut skipped = 0;
        for frame in frames {
            match decode(frame) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed frame");
                    skipped += 1;
                }
            }
        }

        self.skipped += skipped;
        self.buffer.drain(..consumed);
        events
    }
}

/// Move the longest valid UTF-8 prefix out of `bytes`, keeping an incomplete
/// trailing sequence. Invalid sequences become U+FFFD.
fn take_utf8(bytes: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(bytes) {
            Ok(s) => {
                out.push_str(s);
                bytes.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&bytes[..valid]));
                match e.error_len() {
                    None => {
                        bytes.drain(..valid);
                        return out;
                    }
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        bytes.drain(..valid + len);
                    }
                }
            }
        }
    }
}
