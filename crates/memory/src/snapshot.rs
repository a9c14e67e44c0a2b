//! JSON snapshots of the pending queue and the conversation cache.
//!
//! Two documents live in the state directory:
//!
//! - `queue.json`: array of pending queries (queued and in-flight)
//! - `conversations.json`: map of `"userId-channelId"` to conversation
//!
//! Writes go to a sibling temp file that is then renamed over the target,
//! so a crash mid-write leaves the previous snapshot intact. Loads never
//! fail: a missing file is an empty state and a malformed one is logged and
//! treated as empty.

use crate::conversation::ConversationContext;
use eventdesk_core::error::PersistenceError;
use eventdesk_core::query::Query;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub type QueueSnapshot = Vec<Query>;
pub type CacheSnapshot = BTreeMap<String, ConversationContext>;

const QUEUE_FILE: &str = "queue.json";
const CACHE_FILE: &str = "conversations.json";

/// Reads and writes snapshot documents under one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn queue_path(&self) -> PathBuf {
        self.dir.join(QUEUE_FILE)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    pub fn save_queue(&self, queue: &[Query]) -> Result<(), PersistenceError> {
        write_json(&self.queue_path(), &queue)?;
        debug!(pending = queue.len(), "Queue snapshot written");
        Ok(())
    }

    pub fn load_queue(&self) -> QueueSnapshot {
        read_json(&self.queue_path())
    }

    pub fn save_cache(&self, cache: &CacheSnapshot) -> Result<(), PersistenceError> {
        write_json(&self.cache_path(), cache)?;
        debug!(conversations = cache.len(), "Conversation snapshot written");
        Ok(())
    }

    pub fn load_cache(&self) -> CacheSnapshot {
        read_json(&self.cache_path())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let write_err = |e: std::io::Error| PersistenceError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let content =
        serde_json::to_string_pretty(value).map_err(|e| PersistenceError::Encode(e.to_string()))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(write_err)
}

fn read_json<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable snapshot, starting empty");
            return T::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed snapshot, starting empty");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{CachePolicy, ConversationCache};
    use eventdesk_core::message::Role;

    #[test]
    fn missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state"));
        assert!(store.load_queue().is_empty());
        assert!(store.load_cache().is_empty());
    }

    #[test]
    fn malformed_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        std::fs::write(store.queue_path(), "{not json").unwrap();
        std::fs::write(store.cache_path(), "[1, 2, 3]").unwrap();
        assert!(store.load_queue().is_empty());
        assert!(store.load_cache().is_empty());
    }

    #[test]
    fn queue_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let mut retried = Query::new("where is parking", "u2");
        retried.retry_count = 2;
        let queue = vec![
            Query::new("when is lunch", "u1").with_channel("c1"),
            retried,
        ];

        store.save_queue(&queue).unwrap();
        let loaded = store.load_queue();
        assert_eq!(loaded, queue);
        assert!(!store.queue_path().with_extension("json.tmp").exists());
    }

    #[test]
    fn save_creates_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested").join("state"));
        store.save_queue(&[]).unwrap();
        assert!(store.queue_path().exists());
    }

    #[tokio::test]
    async fn cache_document_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let cache = ConversationCache::new(CachePolicy::default());
        cache.append("u1", "c1", Role::User, "what's for dinner").await;
        cache.append("u1", "c1", Role::Assistant, "Pizza at 7pm").await;

        store.save_cache(&cache.snapshot().await).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.cache_path()).unwrap()).unwrap();
        let entry = &raw["u1-c1"];
        assert_eq!(entry["userId"], "u1");
        assert_eq!(entry["channelId"], "c1");
        assert!(entry["lastActivity"].is_string());
        assert_eq!(entry["messages"].as_array().unwrap().len(), 2);
        assert_eq!(entry["messages"][1]["role"], "assistant");

        let loaded = store.load_cache();
        assert_eq!(loaded["u1-c1"].messages[1].content, "Pizza at 7pm");
    }
}
