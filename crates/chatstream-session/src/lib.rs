//! Conversation persistence for chatstream.

/// Message persistence.
pub mod store;

pub use store::{FileMessageStore, InMemoryMessageStore, MessageStore, StoredMessage};
