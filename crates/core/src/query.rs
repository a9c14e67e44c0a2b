//! The unit of work flowing through admission and dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub String);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user's question, from admission until it is resolved or fails.
///
/// The serialized form is exactly one element of the queue snapshot, so
/// field names follow the snapshot layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub id: QueryId,

    pub text: String,

    pub user_id: String,

    /// Absent for direct messages; disables conversation history.
    #[serde(default)]
    pub channel_id: Option<String>,

    /// The chat message this query answers, used to reply after a restart.
    #[serde(default, rename = "messageId")]
    pub source_message_id: Option<String>,

    pub enqueued_at: DateTime<Utc>,

    #[serde(default)]
    pub retry_count: u32,
}

impl Query {
    /// Create a fresh query stamped with the current time.
    pub fn new(text: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: QueryId::new(),
            text: text.into(),
            user_id: user_id.into(),
            channel_id: None,
            source_message_id: None,
            enqueued_at: Utc::now(),
            retry_count: 0,
        }
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_source_message(mut self, message_id: impl Into<String>) -> Self {
        self.source_message_id = Some(message_id.into());
        self
    }

    /// The (user, channel) pair keying conversation history, if any.
    pub fn conversation_key(&self) -> Option<(&str, &str)> {
        self.channel_id
            .as_deref()
            .map(|channel| (self.user_id.as_str(), channel))
    }
}
