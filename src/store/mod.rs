//! Session persistence seam
//!
//! The orchestrator persists messages fire-and-forget: a store failure is
//! logged and never blocks or fails the in-memory turn. The store itself
//! is an external collaborator; [`MemoryStore`] is the bundled
//! implementation (and the test double).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::agent::state::Message;

/// Simple CRUD over session messages.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append_message(&self, session_id: Uuid, message: &Message) -> anyhow::Result<()>;
    async fn update_message(&self, session_id: Uuid, message: &Message) -> anyhow::Result<()>;
    async fn delete_message(&self, session_id: Uuid, message_id: Uuid) -> anyhow::Result<()>;
}

/// In-memory session store.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<Uuid, Vec<Message>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages recorded for a session (test/diagnostic helper)
    pub async fn messages(&self, session_id: Uuid) -> Vec<Message> {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn append_message(&self, session_id: Uuid, message: &Message) -> anyhow::Result<()> {
        self.sessions
            .lock()
            .await
            .entry(session_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn update_message(&self, session_id: Uuid, message: &Message) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().await;
        let messages = sessions
            .get_mut(&session_id)
            .ok_or_else(|| anyhow::anyhow!("unknown session {}", session_id))?;
        let slot = messages
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or_else(|| anyhow::anyhow!("unknown message {}", message.id))?;
        *slot = message.clone();
        Ok(())
    }

    async fn delete_message(&self, session_id: Uuid, message_id: Uuid) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().await;
        if let Some(messages) = sessions.get_mut(&session_id) {
            messages.retain(|m| m.id != message_id);
        }
        Ok(())
    }
}

/// Append a message in the background; persistence failures are logged,
/// never surfaced to the turn.
pub fn persist_append(store: Arc<dyn SessionStore>, session_id: Uuid, message: Message) {
    tokio::spawn(async move {
        if let Err(e) = store.append_message(session_id, &message).await {
            tracing::warn!("failed to persist message {}: {}", message.id, e);
        }
    });
}

/// Update a message in the background.
pub fn persist_update(store: Arc<dyn SessionStore>, session_id: Uuid, message: Message) {
    tokio::spawn(async move {
        if let Err(e) = store.update_message(session_id, &message).await {
            tracing::warn!("failed to update message {}: {}", message.id, e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_update_delete() {
        let store = MemoryStore::new();
        let session = Uuid::new_v4();

        let mut message = Message::user("hello");
        store.append_message(session, &message).await.unwrap();
        assert_eq!(store.messages(session).await.len(), 1);

        message.content = "edited".to_string();
        store.update_message(session, &message).await.unwrap();
        assert_eq!(store.messages(session).await[0].content, "edited");

        store.delete_message(session, message.id).await.unwrap();
        assert!(store.messages(session).await.is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_session_fails() {
        let store = MemoryStore::new();
        let message = Message::user("x");
        assert!(store
            .update_message(Uuid::new_v4(), &message)
            .await
            .is_err());
    }
}
