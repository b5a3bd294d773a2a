//! In-memory conversation registry.
//!
//! The map itself sits behind an `RwLock`. Each conversation carries two
//! locks: a data lock held only while messages are appended or copied, and a
//! turn lock held for a whole turn including the backend call. Readers never
//! take the turn lock, so a slow turn does not block them.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::RelayError;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A named, ordered history of turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    conversation: Mutex<Conversation>,
    turn: Arc<Mutex<()>>,
}

impl Slot {
    fn new(id: &str) -> Self {
        Self {
            conversation: Mutex::new(Conversation::new(id)),
            turn: Arc::new(Mutex::new(())),
        }
    }
}

/// Exclusive right to add messages to one conversation. Released on drop.
#[derive(Debug)]
pub struct Turn {
    slot: Arc<Slot>,
    _guard: OwnedMutexGuard<()>,
}

impl Turn {
    pub async fn push(&self, message: Message) {
        self.slot.conversation.lock().await.messages.push(message);
    }

    /// Remove the most recent message.
    pub async fn pop(&self) -> Option<Message> {
        self.slot.conversation.lock().await.messages.pop()
    }
}

/// Registry of live conversations, keyed by id.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: RwLock<HashMap<String, Arc<Slot>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty conversation. Fails if the id is taken; the check and
    /// the insert happen under one write lock.
    pub async fn start(&self, id: &str) -> Result<(), RelayError> {
        let mut map = self.conversations.write().await;
        match map.entry(id.to_string()) {
            Entry::Occupied(_) => Err(RelayError::ConversationExists(id.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Slot::new(id)));
                Ok(())
            }
        }
    }

    async fn slot(&self, id: &str) -> Result<Arc<Slot>, RelayError> {
        let map = self.conversations.read().await;
        map.get(id)
            .cloned()
            .ok_or_else(|| RelayError::ConversationNotFound(id.to_string()))
    }

    /// Wait for any turn in progress on `id`, then claim the next one.
    pub async fn begin_turn(&self, id: &str) -> Result<Turn, RelayError> {
        let slot = self.slot(id).await?;
        let guard = slot.turn.clone().lock_owned().await;
        Ok(Turn {
            slot,
            _guard: guard,
        })
    }

    /// Snapshot of a conversation as currently stored, including the user
    /// message of a turn still waiting on the backend.
    pub async fn get(&self, id: &str) -> Result<Conversation, RelayError> {
        let slot = self.slot(id).await?;
        let conversation = slot.conversation.lock().await;
        Ok(conversation.clone())
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_then_get_is_empty() {
        let store = ConversationStore::new();
        store.start("abc").await.unwrap();

        let conv = store.get("abc").await.unwrap();
        assert_eq!(conv.id, "abc");
        assert!(conv.messages.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_start_keeps_messages() {
        let store = ConversationStore::new();
        store.start("abc").await.unwrap();
        store
            .begin_turn("abc")
            .await
            .unwrap()
            .push(Message::user("hi"))
            .await;

        let err = store.start("abc").await.unwrap_err();
        assert!(matches!(err, RelayError::ConversationExists(ref id) if id == "abc"));

        let conv = store.get("abc").await.unwrap();
        assert_eq!(conv.messages, vec![Message::user("hi")]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_id() {
        let store = ConversationStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(RelayError::ConversationNotFound(_))
        ));
        assert!(store.begin_turn("nope").await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_starts_one_winner() {
        let store = Arc::new(ConversationStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.start("race").await.is_ok() }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_does_not_wait_for_turn() {
        let store = ConversationStore::new();
        store.start("abc").await.unwrap();

        let turn = store.begin_turn("abc").await.unwrap();
        turn.push(Message::user("pending")).await;

        // The turn is still held; a read goes through anyway.
        let conv = tokio::time::timeout(std::time::Duration::from_millis(200), store.get("abc"))
            .await
            .expect("get blocked behind an open turn")
            .unwrap();
        assert_eq!(conv.messages, vec![Message::user("pending")]);

        // A second turn has to wait for the first.
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.begin_turn("abc"),
        )
        .await;
        assert!(second.is_err());

        drop(turn);
        assert!(store.begin_turn("abc").await.is_ok());
    }

    #[test]
    fn test_message_serializes_lowercase_role() {
        let json = serde_json::to_value(Message::assistant("ok")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "ok"}));
    }
}
