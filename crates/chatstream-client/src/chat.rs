use crate::parser::FrameParser;
use crate::reconstruct::{MessageReconstructor, Outcome};
use chatstream_core::{ChatRequest, ChatStreamError, ChatStreamResult, Event, Role};
use chatstream_session::{MessageStore, StoredMessage};
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of one [`ChatSession::send`].
#[derive(Debug, Clone, PartialEq)]
pub enum TurnResult {
    /// Input was blank; nothing was sent.
    Skipped,
    /// The assistant answered and the answer was appended to the history.
    Answered(StoredMessage),
    /// The stream completed without content.
    Empty { rendering: String },
    /// The turn failed and the user message was retracted from the history.
    Failed { message: String, rendering: String },
}

impl TurnResult {
    /// Text the presentation layer shows for this turn.
    pub fn rendering(&self) -> &str {
        match self {
            TurnResult::Skipped => "",
            TurnResult::Answered(msg) => &msg.content,
            TurnResult::Empty { rendering } | TurnResult::Failed { rendering, .. } => rendering,
        }
    }
}

/// One conversation as seen by a client.
///
/// Owns the visible history, sends each turn to the streaming endpoint, and
/// persists the user and assistant messages through the [`MessageStore`].
pub struct ChatSession {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    chat_id: String,
    store: Arc<dyn MessageStore>,
    history: Vec<StoredMessage>,
}

impl ChatSession {
    /// Start an empty conversation against `base_url` (e.g. `http://localhost:3000`).
    pub fn new(base_url: &str, chat_id: impl Into<String>, store: Arc<dyn MessageStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/api/chat/stream", base_url.trim_end_matches('/')),
            api_key: None,
            chat_id: chat_id.into(),
            store,
            history: Vec::new(),
        }
    }

    /// Continue a conversation whose earlier messages are already in `store`.
    pub async fn resume(
        base_url: &str,
        chat_id: impl Into<String>,
        store: Arc<dyn MessageStore>,
    ) -> ChatStreamResult<Self> {
        let mut session = Self::new(base_url, chat_id, store);
        session.history = session.store.list(&session.chat_id).await?;
        Ok(session)
    }

    /// Present `key` as a bearer token on every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Conversation identifier.
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Visible history, oldest first.
    pub fn history(&self) -> &[StoredMessage] {
        &self.history
    }

    /// Send one user turn. See [`ChatSession::send_with`].
    pub async fn send(&mut self, input: &str) -> ChatStreamResult<TurnResult> {
        self.send_with(input, |_| {}).await
    }

    /// Send one user turn, calling `on_event` for every event as it arrives.
    ///
    /// Only a failure to store the user message is returned as `Err`; every
    /// failure after that is a [`TurnResult::Failed`].
    pub async fn send_with<F>(&mut self, input: &str, mut on_event: F) -> ChatStreamResult<TurnResult>
    where
        F: FnMut(&Event) + Send,
    {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(TurnResult::Skipped);
        }

        let user_id = self.store.store(&self.chat_id, Role::User, trimmed).await?;
        let mut user_message = StoredMessage::new(&self.chat_id, Role::User, trimmed);
        user_message.id = user_id;
        self.history.push(user_message);

        let request = ChatRequest {
            messages: self.history.iter().map(StoredMessage::to_chat_message).collect(),
            chat_id: self.chat_id.clone(),
        };

        match self.stream_turn(&request, &mut on_event).await {
            Outcome::Completed { content } => Ok(TurnResult::Answered(
                self.persist_answer(content).await,
            )),
            Outcome::Empty { rendering } => {
                info!(chat_id = %self.chat_id, "Assistant returned an empty response");
                Ok(TurnResult::Empty { rendering })
            }
            Outcome::Failed { message, rendering } => {
                warn!(chat_id = %self.chat_id, error = %message, "Turn failed");
                self.retract(user_id);
                Ok(TurnResult::Failed { message, rendering })
            }
        }
    }

    /// Run the request and fold its body into an outcome.
    ///
    /// The body stream is owned by this call and dropped on every return path,
    /// which releases the connection.
    async fn stream_turn<F>(&self, request: &ChatRequest, on_event: &mut F) -> Outcome
    where
        F: FnMut(&Event) + Send,
    {
        let mut machine = MessageReconstructor::new();

        let resp = match self.post(request).await {
            Ok(resp) => resp,
            Err(e) => return machine.fail(e.message()),
        };

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = if text.trim().is_empty() {
                status.to_string()
            } else {
                text
            };
            return machine.fail(message);
        }

        let mut parser = FrameParser::new();
        let mut body = resp.bytes_stream();

        while let Some(chunk) = body.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => return machine.fail(format!("Stream read error: {e}")),
            };
            debug!(chat_id = %self.chat_id, len = bytes.len(), "Chunk received");

            for event in parser.parse_bytes(&bytes) {
                on_event(&event);
                if let Some(outcome) = machine.apply(event) {
                    return outcome;
                }
            }
        }

        machine.fail("Stream ended before completion")
    }

    async fn post(&self, request: &ChatRequest) -> ChatStreamResult<reqwest::Response> {
        let mut builder = self.http.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
            .send()
            .await
            .map_err(|e| ChatStreamError::Http(e.to_string()))
    }

    async fn persist_answer(&mut self, content: String) -> StoredMessage {
        let mut message = StoredMessage::new(&self.chat_id, Role::Assistant, content);
        match self
            .store
            .store(&self.chat_id, Role::Assistant, &message.content)
            .await
        {
            Ok(id) => message.id = id,
            Err(e) => {
                error!(chat_id = %self.chat_id, error = %e, "Failed to persist assistant message");
            }
        }
        self.history.push(message.clone());
        message
    }

    fn retract(&mut self, id: Uuid) {
        self.history.retain(|m| m.id != id);
    }
}
