//! Short-lived memory for EventDesk.
//!
//! - [`ConversationCache`]: bounded, TTL-evicted history per (user, channel)
//! - [`SnapshotStore`]: durable JSON snapshots of the queue and the cache,
//!   reloaded best-effort at startup

pub mod conversation;
pub mod snapshot;

pub use conversation::{CachePolicy, ConversationCache, ConversationContext, ConversationKey};
pub use snapshot::{CacheSnapshot, QueueSnapshot, SnapshotStore};
