use crate::agent::{Agent, AgentEvent, AgentEventStream};
use crate::config::ModelConfig;
use crate::context::{ContextWindow, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use chatstream_core::{ChatMessage, ChatStreamError, ChatStreamResult};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Agent backed by an Ollama chat model with streaming enabled.
///
/// Ollama answers `/api/chat` with newline-delimited JSON. Every line with
/// message content becomes an [`AgentEvent::ModelStream`]; the closing
/// `done: true` line produces one [`AgentEvent::ModelOutput`] with the
/// aggregated answer.
pub struct OllamaAgent {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OllamaAgent {
    /// Create an agent for `config` with its own HTTP client.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_body(&self, history: Vec<ChatMessage>) -> serde_json::Value {
        let mut context = ContextWindow::new(self.config.max_history);
        context.set_system_prompt(
            self.config
                .system_prompt
                .as_deref()
                .unwrap_or(DEFAULT_SYSTEM_PROMPT),
        );
        context.extend(history);

        let mut messages = Vec::with_capacity(context.messages().len() + 1);
        if let Some(sys) = context.system_prompt() {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: sys.to_string(),
            });
        }
        messages.extend(context.messages().iter().map(|m| OllamaMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));

        serde_json::json!({
            "model": self.config.model_id,
            "messages": messages,
            "stream": true,
            "options": { "temperature": self.config.temperature },
        })
    }
}

#[async_trait]
impl Agent for OllamaAgent {
    async fn run(
        &self,
        history: Vec<ChatMessage>,
        chat_id: &str,
    ) -> ChatStreamResult<AgentEventStream> {
        let url = self.config.chat_url();
        let body = self.build_body(history);

        info!(chat_id = %chat_id, model = %self.config.model_id, "Starting model run");

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatStreamError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ChatStreamError::Http(format!(
                "Ollama API error {status}: {error_body}"
            )));
        }

        let (tx, rx) = mpsc::channel::<ChatStreamResult<AgentEvent>>(64);
        let mut byte_stream = resp.bytes_stream();

        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();
            let mut full_text = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ChatStreamError::Http(format!("Stream read error: {e}"))))
                            .await;
                        return;
                    }
                };

                buffer.extend_from_slice(&chunk);

                while let Some(line) = take_line(&mut buffer) {
                    if line.is_empty() {
                        continue;
                    }

                    let event = match parse_line(&line, &mut full_text) {
                        Ok(Some(event)) => event,
                        Ok(None) => continue,
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    };
                    let finished = matches!(event, AgentEvent::ModelOutput { .. });
                    if tx.send(Ok(event)).await.is_err() {
                        debug!("Model stream consumer went away");
                        return;
                    }
                    if finished {
                        return;
                    }
                }
            }

            warn!("Model stream ended without a done marker");
            let _ = tx
                .send(Err(ChatStreamError::Agent(
                    "model stream ended unexpectedly".to_string(),
                )))
                .await;
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

/// Remove the first complete line from `buffer` and decode it.
///
/// Lines are split on raw bytes so a multi-byte character cut by a chunk
/// boundary stays in the buffer until the rest of its line arrives.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let line_end = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=line_end).collect();
    Some(String::from_utf8_lossy(&line).trim().to_string())
}

/// Classify one NDJSON line from Ollama.
fn parse_line(line: &str, full_text: &mut String) -> ChatStreamResult<Option<AgentEvent>> {
    let chunk: OllamaChunk = serde_json::from_str(line)?;

    if let Some(error) = chunk.error {
        return Err(ChatStreamError::Agent(error));
    }

    if chunk.done {
        let tail = chunk.message.map(|m| m.content).unwrap_or_default();
        full_text.push_str(&tail);
        return Ok(Some(AgentEvent::ModelOutput {
            content: std::mem::take(full_text),
        }));
    }

    match chunk.message {
        Some(msg) => {
            full_text.push_str(&msg.content);
            Ok(Some(AgentEvent::ModelStream { text: msg.content }))
        }
        None => Ok(None),
    }
}

// -- Ollama wire types --

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streamed_line_becomes_model_stream() {
        let mut full = String::new();
        let ev = parse_line(
            r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#,
            &mut full,
        )
        .unwrap();
        assert_eq!(ev, Some(AgentEvent::ModelStream { text: "Hel".into() }));
        assert_eq!(full, "Hel");
    }

    #[test]
    fn done_line_carries_aggregated_output() {
        let mut full = "Hello".to_string();
        let ev = parse_line(
            r#"{"message":{"role":"assistant","content":""},"done":true}"#,
            &mut full,
        )
        .unwrap();
        assert_eq!(
            ev,
            Some(AgentEvent::ModelOutput {
                content: "Hello".into()
            })
        );
    }

    #[test]
    fn error_line_fails_the_run() {
        let mut full = String::new();
        let err = parse_line(r#"{"error":"model not found"}"#, &mut full).unwrap_err();
        assert_eq!(err.message(), "model not found");
    }

    #[test]
    fn line_split_inside_a_character_is_reassembled() {
        let line = "{\"message\":{\"content\":\"café\"}}\n".as_bytes();
        let cut = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut buffer = line[..cut].to_vec();
        assert_eq!(take_line(&mut buffer), None);
        buffer.extend_from_slice(&line[cut..]);

        let decoded = take_line(&mut buffer).unwrap();
        assert_eq!(decoded, "{\"message\":{\"content\":\"café\"}}");
        assert!(buffer.is_empty());
    }

    #[test]
    fn take_line_keeps_unterminated_tail() {
        let mut buffer = b"{\"done\":false}\n{\"don".to_vec();
        assert_eq!(take_line(&mut buffer).as_deref(), Some("{\"done\":false}"));
        assert_eq!(take_line(&mut buffer), None);
        assert_eq!(buffer, b"{\"don");
    }

    #[test]
    fn body_includes_system_prompt_first() {
        let agent = OllamaAgent::new(ModelConfig::default());
        let body = agent.build_body(vec![ChatMessage::user("hi")]);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "mistral");
    }
}
