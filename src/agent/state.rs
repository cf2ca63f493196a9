//! Conversation state and history shaping
//!
//! The history handed to the provider is trimmed to the context window
//! and alternation-enforced: never two consecutive entries of the same
//! role, and never ending on a `user` entry (the new user text is
//! appended by the caller).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// An attachment carried with a user message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    /// Base64-encoded payload
    pub data: String,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// A single message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier
    pub id: Uuid,
    /// Role of the message sender
    pub role: MessageRole,
    /// Content of the message
    pub content: String,
    /// Timestamp when the message was created
    pub timestamp: DateTime<Utc>,
    /// Which model generated this (for assistant messages)
    pub model: Option<String>,
    /// Token count (if available)
    pub tokens: Option<u32>,
    /// Attachments (user messages)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            model: None,
            tokens: None,
            attachments: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            model: Some(model.into()),
            tokens: None,
            attachments: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: MessageRole::System,
            content: content.into(),
            timestamp: Utc::now(),
            model: None,
            tokens: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// One history entry as handed to the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: MessageRole,
    pub content: String,
}

/// Conversation state for one session
#[derive(Debug)]
pub struct ConversationState {
    /// Current session ID
    pub session_id: Uuid,
    /// Conversation history
    pub messages: Vec<Message>,
    /// Maximum history messages to keep in context
    pub max_history: usize,
    /// Total tokens used in this session
    pub total_tokens: u64,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            messages: Vec::new(),
            max_history: 50,
            total_tokens: 0,
        }
    }

    /// Add a message to the history
    pub fn add_message(&mut self, message: Message) {
        if let Some(tokens) = message.tokens {
            self.total_tokens += tokens as u64;
        }
        self.messages.push(message);

        // Trim history if needed (keep system messages)
        while self.messages.len() > self.max_history {
            if let Some(idx) = self
                .messages
                .iter()
                .position(|m| m.role != MessageRole::System)
            {
                self.messages.remove(idx);
            } else {
                break;
            }
        }
    }

    /// Clear conversation history (keep system messages)
    pub fn clear_history(&mut self) {
        self.messages.retain(|m| m.role == MessageRole::System);
    }

    /// Build the alternation-enforced history view for the provider.
    ///
    /// System messages are excluded (the system prompt travels separately),
    /// the window is the most recent `window` entries, consecutive
    /// same-role entries are merged, and a trailing user entry is dropped
    /// so appending the new user message never yields user→user.
    pub fn history_for_provider(&self, window: usize) -> Vec<HistoryEntry> {
        let recent: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .collect();

        let start = recent.len().saturating_sub(window);
        let mut entries: Vec<HistoryEntry> = Vec::new();

        for message in &recent[start..] {
            match entries.last_mut() {
                Some(last) if last.role == message.role => {
                    last.content.push_str("\n\n");
                    last.content.push_str(&message.content);
                }
                _ => entries.push(HistoryEntry {
                    role: message.role,
                    content: message.content.clone(),
                }),
            }
        }

        if entries.last().map(|e| e.role) == Some(MessageRole::User) {
            entries.pop();
        }

        entries
    }
}

/// Thread-safe shared state
pub type SharedState = Arc<Mutex<ConversationState>>;

/// Create a new shared state
pub fn create_shared_state() -> SharedState {
    Arc::new(Mutex::new(ConversationState::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, MessageRole::User);
        assert_eq!(user_msg.content, "Hello");

        let assistant_msg = Message::assistant("Hi there!", "qwen3:8b");
        assert_eq!(assistant_msg.role, MessageRole::Assistant);
        assert_eq!(assistant_msg.model, Some("qwen3:8b".to_string()));
    }

    #[test]
    fn test_history_trimming_keeps_system() {
        let mut state = ConversationState::new();
        state.max_history = 3;
        state.add_message(Message::system("rules"));
        for i in 0..5 {
            state.add_message(Message::user(format!("msg {}", i)));
        }
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[0].role, MessageRole::System);
    }

    #[test]
    fn test_alternation_merges_same_role_runs() {
        let mut state = ConversationState::new();
        state.add_message(Message::user("first"));
        state.add_message(Message::user("second"));
        state.add_message(Message::assistant("reply", "m"));
        state.add_message(Message::assistant("more", "m"));

        let history = state.history_for_provider(50);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert!(history[0].content.contains("first"));
        assert!(history[0].content.contains("second"));
        assert_eq!(history[1].role, MessageRole::Assistant);
    }

    #[test]
    fn test_alternation_never_ends_on_user() {
        let mut state = ConversationState::new();
        state.add_message(Message::user("q1"));
        state.add_message(Message::assistant("a1", "m"));
        state.add_message(Message::user("dangling"));

        let history = state.history_for_provider(50);
        assert_eq!(history.last().map(|e| e.role), Some(MessageRole::Assistant));
    }

    #[test]
    fn test_alternation_invariant_holds_for_arbitrary_sequences() {
        use MessageRole::*;
        let sequences: Vec<Vec<MessageRole>> = vec![
            vec![User, User, User],
            vec![Assistant, User, User, Assistant, Assistant],
            vec![System, User, System, Assistant],
            vec![],
            vec![Assistant],
            vec![User],
        ];

        for roles in sequences {
            let mut state = ConversationState::new();
            for role in &roles {
                let message = match role {
                    User => Message::user("u"),
                    Assistant => Message::assistant("a", "m"),
                    System => Message::system("s"),
                };
                state.add_message(message);
            }

            let history = state.history_for_provider(50);
            for pair in history.windows(2) {
                assert_ne!(pair[0].role, pair[1].role, "roles {:?}", roles);
            }
            assert_ne!(history.last().map(|e| e.role), Some(User), "roles {:?}", roles);
        }
    }

    #[test]
    fn test_window_applies_before_merge() {
        let mut state = ConversationState::new();
        for i in 0..10 {
            state.add_message(Message::user(format!("q{}", i)));
            state.add_message(Message::assistant(format!("a{}", i), "m"));
        }
        let history = state.history_for_provider(4);
        assert_eq!(history.len(), 4);
        assert!(history[0].content.contains("q8"));
    }
}
