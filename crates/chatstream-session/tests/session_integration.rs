#![allow(clippy::unwrap_used, clippy::expect_used)]

use chatstream_core::{ChatMessage, Role};
use chatstream_session::{FileMessageStore, InMemoryMessageStore, MessageStore};
use std::sync::Arc;

#[tokio::test]
async fn file_store_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let store = FileMessageStore::new(tmp.path().join("messages")).await.unwrap();
        store.store("chat-1", Role::User, "hi").await.unwrap();
    }

    let reopened = FileMessageStore::new(tmp.path().join("messages")).await.unwrap();
    let messages = reopened.list("chat-1").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].to_chat_message(), ChatMessage::user("hi"));
}

#[tokio::test]
async fn chats_are_isolated() {
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::new());
    store.store("a", Role::User, "first").await.unwrap();
    store.store("b", Role::User, "second").await.unwrap();

    let a = store.list("a").await.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].content, "first");
    assert_eq!(a[0].chat_id, "a");
}

#[tokio::test]
async fn concurrent_stores_keep_every_record() {
    let store = Arc::new(InMemoryMessageStore::new());
    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .store("shared", Role::User, &format!("msg {i}"))
                .await
                .unwrap()
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(store.list("shared").await.unwrap().len(), 20);
    assert_eq!(store.len(), 20);
}
