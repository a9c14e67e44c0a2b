//! The entry point a chat gateway talks to.
//!
//! [`Assistant`] wires the admission gate, the conversation cache, the
//! dispatcher and the snapshot store together, restores snapshots on
//! startup and runs the periodic maintenance task (cache sweep, limiter
//! pruning, cache snapshot).

use crate::context::{ContextSelector, EventDocument, PromptBuilder};
use crate::dispatcher::{Dispatcher, DispatcherHandle, DispatcherSettings, RecoveredResult};
use crate::stats::DispatcherStats;
use chrono::Utc;
use eventdesk_admission::{Admission, RateLimitPolicy, RateLimiter};
use eventdesk_config::AppConfig;
use eventdesk_core::error::DispatchError;
use eventdesk_core::provider::Provider;
use eventdesk_core::query::Query;
use eventdesk_memory::{CachePolicy, ConversationCache, SnapshotStore};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the caller gets back for an admitted or deferred query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The full answer text. Splitting it for the chat transport is the
    /// caller's job.
    Answer(String),
    /// Admission said not yet; nothing was enqueued.
    Deferred { retry_after: Duration },
}

/// Optional extras for [`Assistant::submit_with`].
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub channel_id: Option<String>,
    /// Id of the chat message being answered, kept in the queue snapshot.
    pub correlation_id: Option<String>,
    pub cancel: Option<CancellationToken>,
}

pub struct AssistantBuilder {
    config: AppConfig,
    provider: Arc<dyn Provider>,
    document: EventDocument,
    store: Option<SnapshotStore>,
    recovered: Option<mpsc::UnboundedSender<RecoveredResult>>,
}

impl AssistantBuilder {
    pub fn with_document(mut self, document: EventDocument) -> Self {
        self.document = document;
        self
    }

    /// Persist and restore the queue and cache under this store.
    pub fn with_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_recovered_results(mut self, tx: mpsc::UnboundedSender<RecoveredResult>) -> Self {
        self.recovered = Some(tx);
        self
    }

    /// Restore snapshots, spawn the dispatcher and maintenance task, then
    /// re-enqueue recovered work.
    pub async fn start(self) -> Assistant {
        let config = self.config;
        let cache = ConversationCache::new(CachePolicy::from(&config.conversation));
        let limiter = Arc::new(RateLimiter::new(RateLimitPolicy::from(&config.admission)));

        let recovered_queue = match &self.store {
            Some(store) => {
                let restored = cache.restore(store.load_cache(), Utc::now()).await;
                let queue = store.load_queue();
                info!(
                    state_dir = %store.dir().display(),
                    conversations = restored,
                    queries = queue.len(),
                    "Restored snapshots"
                );
                queue
            }
            None => Vec::new(),
        };

        let selector = ContextSelector::new(Arc::new(self.document));
        let mut dispatcher = Dispatcher::new(
            DispatcherSettings::from_config(&config),
            self.provider,
            selector,
            PromptBuilder::new(&config.knowledge.instructions),
            cache.clone(),
        );
        if let Some(store) = &self.store {
            dispatcher = dispatcher.with_store(store.clone());
        }
        if let Some(tx) = self.recovered {
            dispatcher = dispatcher.with_recovered_results(tx);
        }
        let (dispatcher, engine) = dispatcher.spawn();

        for query in recovered_queue {
            let id = query.id.clone();
            if let Err(e) = dispatcher.enqueue_recovered(query) {
                warn!(query_id = %id, error = %e, "Could not re-enqueue recovered query");
            }
        }

        let stop = CancellationToken::new();
        let maintenance = spawn_maintenance(
            config.conversation.sweep_interval(),
            cache.clone(),
            limiter.clone(),
            self.store.clone(),
            stop.clone(),
        );

        Assistant {
            limiter,
            cache,
            dispatcher,
            store: self.store,
            contact: config.knowledge.contact_fallback.clone(),
            stop,
            tasks: Mutex::new(vec![engine, maintenance]),
        }
    }
}

pub struct Assistant {
    limiter: Arc<RateLimiter>,
    cache: ConversationCache,
    dispatcher: DispatcherHandle,
    store: Option<SnapshotStore>,
    contact: String,
    stop: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Assistant {
    pub fn builder(config: AppConfig, provider: Arc<dyn Provider>) -> AssistantBuilder {
        AssistantBuilder {
            config,
            provider,
            document: EventDocument::empty(),
            store: None,
            recovered: None,
        }
    }

    /// Admit, enqueue and wait for an answer.
    ///
    /// A missing `channel_id` disables conversation history for this call.
    pub async fn submit_query(
        &self,
        text: &str,
        user_id: &str,
        channel_id: Option<&str>,
        correlation_id: Option<&str>,
    ) -> Result<Reply, DispatchError> {
        self.submit_with(
            text,
            user_id,
            SubmitOptions {
                channel_id: channel_id.map(str::to_string),
                correlation_id: correlation_id.map(str::to_string),
                cancel: None,
            },
        )
        .await
    }

    pub async fn submit_with(
        &self,
        text: &str,
        user_id: &str,
        options: SubmitOptions,
    ) -> Result<Reply, DispatchError> {
        // Rejected queries must not use up the user's allowance.
        if self.stop.is_cancelled() {
            return Err(DispatchError::ShuttingDown);
        }
        if self.dispatcher.is_closed() {
            return Err(DispatchError::Closed);
        }
        if let Admission::Denied { retry_after } = self.limiter.admit(user_id) {
            return Ok(Reply::Deferred { retry_after });
        }

        let mut query = Query::new(text, user_id);
        query.channel_id = options.channel_id;
        query.source_message_id = options.correlation_id;

        let pending = self.dispatcher.submit(query, options.cancel)?;
        debug!(query_id = %pending.query_id(), user_id, "Query admitted");
        pending.answer().await.map(Reply::Answer)
    }

    pub async fn stats(&self) -> DispatcherStats {
        let active = self.cache.len().await;
        self.dispatcher.stats().snapshot(active)
    }

    /// Forget the conversation for (user, channel). Idempotent.
    pub async fn clear_conversation(&self, user_id: &str, channel_id: &str) -> bool {
        self.cache.clear(user_id, channel_id).await
    }

    /// Human-contact sentence appended to every failure message.
    pub fn contact_fallback(&self) -> &str {
        &self.contact
    }

    /// Plain-text message for a failed query.
    pub fn failure_message(&self, error: &DispatchError) -> String {
        error.user_message(&self.contact)
    }

    pub fn conversations(&self) -> &ConversationCache {
        &self.cache
    }

    pub fn dispatcher(&self) -> &DispatcherHandle {
        &self.dispatcher
    }

    /// Stop admitting work, drain the dispatcher and write final snapshots.
    pub async fn shutdown(&self) {
        info!("Shutting down");
        self.stop.cancel();
        self.dispatcher.shutdown().await;

        if let Some(store) = &self.store {
            save_cache(store, &self.cache).await;
        }

        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Shutdown complete");
    }
}

fn spawn_maintenance(
    every: Duration,
    cache: ConversationCache,
    limiter: Arc<RateLimiter>,
    store: Option<SnapshotStore>,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        // The first tick fires immediately; nothing to sweep yet.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = interval.tick() => {}
            }

            let swept = cache.sweep(Utc::now()).await;
            let pruned = limiter.prune_stale();
            debug!(swept, pruned, tracked_users = limiter.tracked_users(), "Maintenance pass");

            if let Some(store) = &store {
                save_cache(store, &cache).await;
            }
        }
    })
}

async fn save_cache(store: &SnapshotStore, cache: &ConversationCache) {
    if let Err(e) = store.save_cache(&cache.snapshot().await) {
        warn!(error = %e, "Failed to write conversation snapshot");
    }
}
