use async_trait::async_trait;
use chatstream_core::{ChatMessage, ChatStreamError, ChatStreamResult, Role};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// StoredMessage
// ---------------------------------------------------------------------------

/// A persisted conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Record id returned by [`MessageStore::store`].
    pub id: Uuid,
    /// Conversation the message belongs to.
    pub chat_id: String,
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// A new record with a fresh id and the current time.
    pub fn new(chat_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id: chat_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// The history entry sent to the streaming endpoint.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageStore trait
// ---------------------------------------------------------------------------

/// Persistence collaborator for conversation messages.
///
/// Failures are reported to the caller and never retried here.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one message and return its record id.
    async fn store(&self, chat_id: &str, role: Role, content: &str) -> ChatStreamResult<Uuid>;

    /// All messages of a conversation, oldest first.
    async fn list(&self, chat_id: &str) -> ChatStreamResult<Vec<StoredMessage>>;
}

// ---------------------------------------------------------------------------
// FileMessageStore
// ---------------------------------------------------------------------------

/// Append-only JSON-lines store, one file per conversation.
pub struct FileMessageStore {
    dir: PathBuf,
}

impl FileMessageStore {
    /// Open a store rooted at `dir`, creating it if needed.
    pub async fn new(dir: PathBuf) -> ChatStreamResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn chat_path(&self, chat_id: &str) -> ChatStreamResult<PathBuf> {
        let valid = !chat_id.is_empty()
            && chat_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ChatStreamError::Session(format!(
                "invalid chat id '{chat_id}'"
            )));
        }
        Ok(self.dir.join(format!("{chat_id}.jsonl")))
    }
}

#[async_trait]
impl MessageStore for FileMessageStore {
    async fn store(&self, chat_id: &str, role: Role, content: &str) -> ChatStreamResult<Uuid> {
        let path = self.chat_path(chat_id)?;
        let record = StoredMessage::new(chat_id, role, content);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(chat_id = %chat_id, id = %record.id, role = role.as_str(), "Message stored");
        Ok(record.id)
    }

    async fn list(&self, chat_id: &str) -> ChatStreamResult<Vec<StoredMessage>> {
        let path = self.chat_path(chat_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        data.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str(l).map_err(|e| {
                    ChatStreamError::Session(format!("Failed to parse message record: {e}"))
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// InMemoryMessageStore
// ---------------------------------------------------------------------------

/// Store kept in memory, for tests and throwaway sessions.
#[derive(Default)]
pub struct InMemoryMessageStore {
    chats: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemoryMessageStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored messages across all chats.
    pub fn len(&self) -> usize {
        self.chats.lock().values().map(Vec::len).sum()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn store(&self, chat_id: &str, role: Role, content: &str) -> ChatStreamResult<Uuid> {
        let record = StoredMessage::new(chat_id, role, content);
        let id = record.id;
        self.chats
            .lock()
            .entry(chat_id.to_string())
            .or_default()
            .push(record);
        Ok(id)
    }

    async fn list(&self, chat_id: &str) -> ChatStreamResult<Vec<StoredMessage>> {
        Ok(self.chats.lock().get(chat_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
