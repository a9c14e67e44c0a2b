//! Per-(user, channel) conversation history.
//!
//! Each context keeps at most `max_entries` turns and is forgotten after
//! `ttl` of inactivity. Only the last `history_window` turns are replayed
//! into prompts. None of these operations fail: a missing context simply
//! reads as empty history.

use crate::snapshot::CacheSnapshot;
use chrono::{DateTime, Utc};
use eventdesk_config::ConversationConfig;
use eventdesk_core::message::{ConversationEntry, Role};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Identifies one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub user_id: String,
    pub channel_id: String,
}

impl ConversationKey {
    pub fn new(user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
        }
    }

    /// Key used in the cache snapshot document: `"userId-channelId"`.
    pub fn snapshot_key(&self) -> String {
        format!("{}-{}", self.user_id, self.channel_id)
    }
}

/// Remembered turns for one conversation.
///
/// Serializes to one value of the cache snapshot map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub user_id: String,
    pub channel_id: String,
    pub messages: Vec<ConversationEntry>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationContext {
    fn new(key: &ConversationKey, now: DateTime<Utc>) -> Self {
        Self {
            user_id: key.user_id.clone(),
            channel_id: key.channel_id.clone(),
            messages: Vec::new(),
            last_activity: now,
        }
    }

    fn key(&self) -> ConversationKey {
        ConversationKey::new(&self.user_id, &self.channel_id)
    }

    fn truncate_front(&mut self, max_entries: usize) {
        if self.messages.len() > max_entries {
            let excess = self.messages.len() - max_entries;
            self.messages.drain(..excess);
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.last_activity > ttl
    }
}

/// Bounds applied by the cache.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub max_entries: usize,
    pub history_window: usize,
    pub ttl: Duration,
}

impl From<&ConversationConfig> for CachePolicy {
    fn from(config: &ConversationConfig) -> Self {
        Self {
            max_entries: config.max_entries.max(1),
            history_window: config.history_window.min(config.max_entries),
            ttl: config.ttl(),
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from(&ConversationConfig::default())
    }
}

impl CachePolicy {
    fn chrono_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX)
    }
}

/// Thread-safe conversation cache.
#[derive(Clone)]
pub struct ConversationCache {
    policy: CachePolicy,
    contexts: Arc<RwLock<HashMap<ConversationKey, ConversationContext>>>,
}

impl ConversationCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            contexts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Append a turn, creating the conversation on first use.
    pub async fn append(&self, user_id: &str, channel_id: &str, role: Role, content: &str) {
        self.append_at(user_id, channel_id, role, content, Utc::now())
            .await;
    }

    pub async fn append_at(
        &self,
        user_id: &str,
        channel_id: &str,
        role: Role,
        content: &str,
        now: DateTime<Utc>,
    ) {
        let key = ConversationKey::new(user_id, channel_id);
        let mut contexts = self.contexts.write().await;
        let context = contexts
            .entry(key.clone())
            .or_insert_with(|| ConversationContext::new(&key, now));
        context
            .messages
            .push(ConversationEntry::new(role, content, now));
        context.truncate_front(self.policy.max_entries);
        context.last_activity = now;
    }

    /// The most recent `history_window` turns, oldest first.
    pub async fn history(&self, user_id: &str, channel_id: &str) -> Vec<ConversationEntry> {
        let key = ConversationKey::new(user_id, channel_id);
        let contexts = self.contexts.read().await;
        let Some(context) = contexts.get(&key) else {
            return Vec::new();
        };
        let skip = context
            .messages
            .len()
            .saturating_sub(self.policy.history_window);
        context.messages[skip..].to_vec()
    }

    /// Forget a conversation. Returns whether one existed.
    pub async fn clear(&self, user_id: &str, channel_id: &str) -> bool {
        let key = ConversationKey::new(user_id, channel_id);
        let removed = self.contexts.write().await.remove(&key).is_some();
        if removed {
            debug!(user_id, channel_id, "Conversation cleared");
        }
        removed
    }

    /// Remove every conversation idle for longer than the TTL.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.policy.chrono_ttl();
        let mut contexts = self.contexts.write().await;
        let before = contexts.len();
        contexts.retain(|_, context| !context.is_expired(now, ttl));
        let removed = before - contexts.len();
        if removed > 0 {
            info!(removed, remaining = contexts.len(), "Swept idle conversations");
        }
        removed
    }

    /// Number of live conversations.
    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }

    /// Project the cache into its snapshot document.
    pub async fn snapshot(&self) -> CacheSnapshot {
        self.contexts
            .read()
            .await
            .iter()
            .map(|(key, context)| (key.snapshot_key(), context.clone()))
            .collect()
    }

    /// Load a snapshot, skipping conversations that expired while the
    /// process was down. Returns how many were restored.
    pub async fn restore(&self, snapshot: CacheSnapshot, now: DateTime<Utc>) -> usize {
        let ttl = self.policy.chrono_ttl();
        let mut contexts = self.contexts.write().await;
        let mut restored = 0;
        for (_, mut context) in snapshot {
            if context.is_expired(now, ttl) {
                continue;
            }
            context.truncate_front(self.policy.max_entries);
            contexts.insert(context.key(), context);
            restored += 1;
        }
        restored
    }
}

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> ConversationCache {
        ConversationCache::new(CachePolicy {
            max_entries: 10,
            history_window: 6,
            ttl: Duration::from_secs(30 * 60),
        })
    }

    #[tokio::test]
    async fn history_of_unknown_conversation_is_empty() {
        let cache = cache();
        assert!(cache.history("u1", "c1").await.is_empty());
    }

    #[tokio::test]
    async fn history_returns_most_recent_in_order() {
        let cache = cache();
        for i in 0..12 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            cache.append("u1", "c1", role, &format!("turn {i}")).await;
        }

        let history = cache.history("u1", "c1").await;
        assert_eq!(history.len(), 6);
        let contents: Vec<_> = history.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(
            contents,
            ["turn 6", "turn 7", "turn 8", "turn 9", "turn 10", "turn 11"]
        );
    }

    #[tokio::test]
    async fn stored_entries_never_exceed_bound() {
        let cache = cache();
        for i in 0..12 {
            cache.append("u1", "c1", Role::User, &format!("q{i}")).await;
        }
        let snapshot = cache.snapshot().await;
        let context = &snapshot["u1-c1"];
        assert_eq!(context.messages.len(), 10);
        assert_eq!(context.messages[0].content, "q2");
    }

    #[tokio::test]
    async fn conversations_are_keyed_by_user_and_channel() {
        let cache = cache();
        cache.append("u1", "c1", Role::User, "a").await;
        cache.append("u1", "c2", Role::User, "b").await;
        cache.append("u2", "c1", Role::User, "c").await;
        assert_eq!(cache.len().await, 3);
        assert_eq!(cache.history("u1", "c2").await[0].content, "b");
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let cache = cache();
        cache.append("u1", "c1", Role::User, "hello").await;
        assert!(cache.clear("u1", "c1").await);
        assert!(!cache.clear("u1", "c1").await);
        assert!(!cache.clear("nobody", "nowhere").await);
        assert!(cache.history("u1", "c1").await.is_empty());
    }

    #[tokio::test]
    async fn sweep_drops_idle_conversations() {
        let cache = cache();
        let t0 = Utc::now();
        cache.append_at("idle", "c1", Role::User, "hi", t0).await;
        cache
            .append_at(
                "active",
                "c1",
                Role::User,
                "hi",
                t0 + chrono::Duration::minutes(20),
            )
            .await;

        let removed = cache.sweep(t0 + chrono::Duration::minutes(31)).await;
        assert_eq!(removed, 1);
        assert!(cache.history("idle", "c1").await.is_empty());
        assert_eq!(cache.history("active", "c1").await.len(), 1);
    }

    #[tokio::test]
    async fn append_refreshes_activity() {
        let cache = cache();
        let t0 = Utc::now();
        cache.append_at("u1", "c1", Role::User, "q", t0).await;
        cache
            .append_at("u1", "c1", Role::Assistant, "a", t0 + chrono::Duration::minutes(25))
            .await;
        assert_eq!(cache.sweep(t0 + chrono::Duration::minutes(40)).await, 0);
    }

    #[tokio::test]
    async fn snapshot_restore_skips_expired() {
        let source = cache();
        let t0 = Utc::now();
        source.append_at("u1", "c1", Role::User, "old", t0).await;
        source
            .append_at("u2", "c1", Role::User, "new", t0 + chrono::Duration::minutes(50))
            .await;
        let snapshot = source.snapshot().await;
        assert!(snapshot.contains_key("u1-c1"));

        let target = cache();
        let restored = target
            .restore(snapshot, t0 + chrono::Duration::minutes(55))
            .await;
        assert_eq!(restored, 1);
        assert_eq!(target.history("u2", "c1").await[0].content, "new");
    }
}
