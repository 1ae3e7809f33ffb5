//! Text renderings of tool regions and failures.

use serde_json::Value;

/// First line of a tool block.
pub const TOOL_BLOCK_START: &str = "---START---";
/// Last line of a tool block.
pub const TOOL_BLOCK_END: &str = "---END---";

/// Stands in for the output of a tool call that has not finished.
pub const PROCESSING_MARKER: &str = "Processing...";

/// Input line of the failure block.
pub const FAILURE_INPUT: &str = "Failed to process message";
/// Input line of the empty-response block.
pub const EMPTY_RESPONSE_INPUT: &str = "Assistant did not return a response.";
/// Output line of the empty-response block.
pub const EMPTY_RESPONSE_OUTPUT: &str =
    "No response generated. Please try again or rephrase your question.";

/// Strings render verbatim; anything else as pretty-printed JSON.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// A terminal-style block showing one tool call.
pub fn tool_block(tool: &str, input: &str, output: &str) -> String {
    format!(
        "{TOOL_BLOCK_START}\n~/{tool}\n$ Input\n{input}\n$ Output\n{output}\n{TOOL_BLOCK_END}"
    )
}

/// Shown in place of the answer when a turn fails.
pub fn failure_block(message: &str) -> String {
    tool_block("error", FAILURE_INPUT, message)
}

/// Shown when a turn completes with no content.
pub fn empty_response_block() -> String {
    tool_block("error", EMPTY_RESPONSE_INPUT, EMPTY_RESPONSE_OUTPUT)
}
