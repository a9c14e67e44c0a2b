//! Message and conversation value objects.
//!
//! A [`Message`] is one element of a prompt sent upstream. A
//! [`ConversationEntry`] is what the conversation cache remembers between
//! queries; it converts into a `Message` during prompt assembly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The chat user asking questions
    User,
    /// The assistant's answer
    Assistant,
    /// Base instructions and event data
    System,
}

/// A single message in an upstream prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }
}

/// One remembered turn of a per-(user, channel) conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    /// Convert into a prompt message, keeping the original timestamp.
    pub fn to_message(&self) -> Message {
        Message {
            id: Uuid::new_v4().to_string(),
            role: self.role,
            content: self.content.clone(),
            timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("When does hacking start?");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "When does hacking start?");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn role_serializes_lowercase() {
        let entry = ConversationEntry::new(Role::Assistant, "Saturday 9am", Utc::now());
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""role":"assistant""#));
    }

    #[test]
    fn entry_converts_to_message() {
        let ts = Utc::now();
        let entry = ConversationEntry::new(Role::User, "hi", ts);
        let msg = entry.to_message();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.timestamp, ts);
    }
}
