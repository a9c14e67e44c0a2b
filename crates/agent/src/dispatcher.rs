//! The queue engine.
//!
//! A single task owns the FIFO queue and the in-flight table. Callers talk
//! to it over a command channel and get their answer back on a oneshot.
//! Each attempt runs on its own spawned task so a slow upstream call never
//! blocks admission of further work; attempts report back on an internal
//! channel and the owning task decides what happens next.
//!
//! ```text
//! Queued -> InFlight -> Resolved
//!                    -> Requeued (tail) -> InFlight ...
//!                    -> Failed
//! ```

use crate::context::{ContextSelector, PromptBuilder};
use crate::stats::StatsRecorder;
use eventdesk_config::AppConfig;
use eventdesk_core::error::{DispatchError, ProviderError};
use eventdesk_core::failure::{FailureKind, classify};
use eventdesk_core::message::Role;
use eventdesk_core::provider::{Provider, ProviderRequest};
use eventdesk_core::query::{Query, QueryId};
use eventdesk_memory::{ConversationCache, SnapshotStore};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Returned when the upstream answers with nothing but whitespace.
pub const EMPTY_RESPONSE_MESSAGE: &str =
    "Sorry, I couldn't process that question. Could you try rephrasing it?";

/// Tunables for the engine, lifted out of [`AppConfig`].
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub attempt_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub snapshot_interval: Duration,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl DispatcherSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let d = &config.dispatcher;
        Self {
            max_concurrency: d.max_concurrency.max(1),
            max_retries: d.max_retries,
            backoff_base: Duration::from_millis(d.backoff_base_ms),
            backoff_max: Duration::from_millis(d.backoff_max_ms),
            attempt_timeout: config.upstream.timeout(),
            shutdown_timeout: d.shutdown_timeout(),
            snapshot_interval: d.snapshot_interval().max(Duration::from_millis(100)),
            model: config.upstream.model.clone(),
            temperature: config.upstream.temperature,
            max_tokens: Some(config.upstream.max_tokens),
        }
    }

    /// Delay before retry number `retry` (1-based): capped exponential.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Outcome of a query that was restored from a snapshot, so the gateway
/// can still reply to the original chat message.
#[derive(Debug, Clone)]
pub struct RecoveredResult {
    pub query: Query,
    pub outcome: Result<String, DispatchError>,
}

/// The caller's side of an enqueued query.
#[derive(Debug)]
pub struct PendingAnswer {
    query_id: QueryId,
    rx: oneshot::Receiver<Result<String, DispatchError>>,
}

impl PendingAnswer {
    pub fn query_id(&self) -> &QueryId {
        &self.query_id
    }

    /// Wait for the query to resolve or fail.
    pub async fn answer(self) -> Result<String, DispatchError> {
        self.rx.await.unwrap_or(Err(DispatchError::Closed))
    }
}

enum Responder {
    Caller(oneshot::Sender<Result<String, DispatchError>>),
    Recovered,
}

struct Job {
    query: Query,
    responder: Responder,
    cancel: Option<CancellationToken>,
}

impl Job {
    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

enum Command {
    Enqueue(Job),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug)]
enum AttemptOutcome {
    Answered(String),
    Empty,
    Retry { kind: FailureKind, detail: String },
    Failed { kind: FailureKind, detail: String },
    Cancelled,
}

struct AttemptReport {
    id: QueryId,
    outcome: AttemptOutcome,
}

/// Everything an attempt needs, shared by all attempt tasks.
struct Upstream {
    provider: Arc<dyn Provider>,
    selector: ContextSelector,
    prompts: PromptBuilder,
    cache: ConversationCache,
    auth_alarm: AtomicBool,
}

impl Upstream {
    fn raise_auth_alarm(&self, error: &ProviderError) {
        if !self.auth_alarm.swap(true, Ordering::SeqCst) {
            error!(
                provider = self.provider.name(),
                error = %error,
                "Upstream rejected our credentials, every query will fail until the API key is fixed"
            );
        } else {
            debug!(error = %error, "Upstream auth failure");
        }
    }
}

/// Cloneable handle to a running dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    commands: mpsc::UnboundedSender<Command>,
    stats: Arc<StatsRecorder>,
}

impl DispatcherHandle {
    /// Enqueue and wait for the answer.
    pub async fn enqueue(&self, query: Query) -> Result<String, DispatchError> {
        self.submit(query, None)?.answer().await
    }

    /// Enqueue without waiting. The token is checked before every attempt.
    pub fn submit(
        &self,
        query: Query,
        cancel: Option<CancellationToken>,
    ) -> Result<PendingAnswer, DispatchError> {
        let (tx, rx) = oneshot::channel();
        let query_id = query.id.clone();
        self.commands
            .send(Command::Enqueue(Job {
                query,
                responder: Responder::Caller(tx),
                cancel,
            }))
            .map_err(|_| DispatchError::Closed)?;
        Ok(PendingAnswer { query_id, rx })
    }

    /// Re-enqueue a query restored from a snapshot. It has no waiting caller.
    pub fn enqueue_recovered(&self, query: Query) -> Result<(), DispatchError> {
        self.commands
            .send(Command::Enqueue(Job {
                query,
                responder: Responder::Recovered,
                cancel: None,
            }))
            .map_err(|_| DispatchError::Closed)
    }

    /// Stop accepting work, drain in-flight queries (bounded by the
    /// shutdown timeout) and flush the queue snapshot.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn stats(&self) -> &StatsRecorder {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// The engine before it is spawned.
pub struct Dispatcher {
    settings: Arc<DispatcherSettings>,
    upstream: Arc<Upstream>,
    stats: Arc<StatsRecorder>,
    store: Option<SnapshotStore>,
    recovered: Option<mpsc::UnboundedSender<RecoveredResult>>,
    queue: VecDeque<Job>,
    in_flight: HashMap<QueryId, Job>,
    /// Queries that were never answered because shutdown began.
    parked: Vec<Query>,
    reports: mpsc::UnboundedSender<AttemptReport>,
    draining: bool,
    dirty: bool,
}

impl Dispatcher {
    pub fn new(
        settings: DispatcherSettings,
        provider: Arc<dyn Provider>,
        selector: ContextSelector,
        prompts: PromptBuilder,
        cache: ConversationCache,
    ) -> Self {
        // Replaced in spawn(); keeps the struct constructible without a receiver.
        let (reports, _) = mpsc::unbounded_channel();
        Self {
            settings: Arc::new(settings),
            upstream: Arc::new(Upstream {
                provider,
                selector,
                prompts,
                cache,
                auth_alarm: AtomicBool::new(false),
            }),
            stats: Arc::new(StatsRecorder::new()),
            store: None,
            recovered: None,
            queue: VecDeque::new(),
            in_flight: HashMap::new(),
            parked: Vec::new(),
            reports,
            draining: false,
            dirty: false,
        }
    }

    /// Mirror the pending queue to disk.
    pub fn with_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Deliver outcomes of recovered queries here instead of only logging them.
    pub fn with_recovered_results(mut self, tx: mpsc::UnboundedSender<RecoveredResult>) -> Self {
        self.recovered = Some(tx);
        self
    }

    /// Start the owning task.
    pub fn spawn(mut self) -> (DispatcherHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        self.reports = reports_tx;

        let handle = DispatcherHandle {
            commands: commands_tx,
            stats: self.stats.clone(),
        };
        let task = tokio::spawn(self.run(commands_rx, reports_rx));
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut reports: mpsc::UnboundedReceiver<AttemptReport>,
    ) {
        let mut tick = tokio::time::interval(self.settings.snapshot_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;
        let mut drain_deadline: Option<Instant> = None;
        let mut waiters: Vec<oneshot::Sender<()>> = Vec::new();

        info!(
            max_concurrency = self.settings.max_concurrency,
            max_retries = self.settings.max_retries,
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                command = commands.recv(), if commands_open => match command {
                    Some(Command::Enqueue(job)) => self.accept(job),
                    Some(Command::Shutdown(done)) => {
                        waiters.push(done);
                        drain_deadline.get_or_insert_with(|| self.begin_drain());
                    }
                    None => {
                        commands_open = false;
                        drain_deadline.get_or_insert_with(|| self.begin_drain());
                    }
                },
                Some(report) = reports.recv() => self.complete(report).await,
                _ = tick.tick() => self.flush_if_dirty(),
                _ = tokio::time::sleep_until(drain_deadline.unwrap_or_else(Instant::now)),
                    if drain_deadline.is_some() && !self.in_flight.is_empty() => {
                    warn!(
                        in_flight = self.in_flight.len(),
                        "Shutdown timeout elapsed, abandoning in-flight queries"
                    );
                    self.abandon_in_flight();
                }
            }

            if self.draining {
                if self.in_flight.is_empty() {
                    break;
                }
            } else {
                self.pump();
            }
        }

        self.flush();
        for done in waiters {
            let _ = done.send(());
        }
        info!(pending = self.parked.len(), "Dispatcher stopped");
    }

    fn accept(&mut self, job: Job) {
        if self.draining {
            self.respond(job, Err(DispatchError::ShuttingDown));
            return;
        }
        self.stats.record_enqueued();
        debug!(
            query_id = %job.query.id,
            user_id = %job.query.user_id,
            queue_len = self.queue.len() + 1,
            "Query enqueued"
        );
        self.queue.push_back(job);
        self.dirty = true;
        self.update_gauges();
    }

    /// Launch queued work until the concurrency cap is reached.
    fn pump(&mut self) {
        while self.in_flight.len() < self.settings.max_concurrency {
            let Some(job) = self.queue.pop_front() else {
                break;
            };
            if job.is_cancelled() {
                debug!(query_id = %job.query.id, "Dropping cancelled query");
                self.respond(job, Err(DispatchError::Cancelled));
                self.dirty = true;
                continue;
            }
            self.launch(job);
        }
        self.update_gauges();
    }

    fn launch(&mut self, job: Job) {
        let query = job.query.clone();
        let cancel = job.cancel.clone();
        self.in_flight.insert(query.id.clone(), job);

        debug!(
            query_id = %query.id,
            attempt = query.retry_count + 1,
            in_flight = self.in_flight.len(),
            "Attempt started"
        );

        let upstream = self.upstream.clone();
        let settings = self.settings.clone();
        let reports = self.reports.clone();
        tokio::spawn(async move {
            let outcome = attempt(&upstream, &settings, &query, cancel.as_ref()).await;
            let _ = reports.send(AttemptReport {
                id: query.id,
                outcome,
            });
        });
    }

    async fn complete(&mut self, report: AttemptReport) {
        // Unknown ids belong to attempts abandoned at shutdown.
        let Some(mut job) = self.in_flight.remove(&report.id) else {
            return;
        };
        self.dirty = true;

        match report.outcome {
            AttemptOutcome::Answered(text) => {
                if let Some((user_id, channel_id)) = job.query.conversation_key() {
                    let cache = &self.upstream.cache;
                    cache
                        .append(user_id, channel_id, Role::User, &job.query.text)
                        .await;
                    cache
                        .append(user_id, channel_id, Role::Assistant, &text)
                        .await;
                }
                debug!(query_id = %job.query.id, "Query answered");
                self.respond(job, Ok(text));
            }
            AttemptOutcome::Empty => {
                debug!(query_id = %job.query.id, "Upstream returned an empty answer");
                self.respond(job, Ok(EMPTY_RESPONSE_MESSAGE.to_string()));
            }
            AttemptOutcome::Retry { kind, detail } => {
                job.query.retry_count += 1;
                warn!(
                    query_id = %job.query.id,
                    retry = job.query.retry_count,
                    kind = %kind,
                    error = %detail,
                    "Retryable upstream failure, requeueing"
                );
                if self.draining {
                    self.parked.push(job.query.clone());
                    self.respond(job, Err(DispatchError::ShuttingDown));
                } else {
                    self.queue.push_back(job);
                }
            }
            AttemptOutcome::Failed { kind, detail } => {
                warn!(
                    query_id = %job.query.id,
                    retry = job.query.retry_count,
                    kind = %kind,
                    error = %detail,
                    "Query failed"
                );
                self.respond(job, Err(DispatchError::Upstream { kind, detail }));
            }
            AttemptOutcome::Cancelled => {
                debug!(query_id = %job.query.id, "Query cancelled");
                self.respond(job, Err(DispatchError::Cancelled));
            }
        }
        self.update_gauges();
    }

    /// Stop launching work. Queued callers are released right away, but
    /// their queries stay in the snapshot so a restart picks them up.
    fn begin_drain(&mut self) -> Instant {
        self.draining = true;
        let queued: Vec<Job> = self.queue.drain(..).collect();
        info!(
            queued = queued.len(),
            in_flight = self.in_flight.len(),
            "Dispatcher draining"
        );
        for job in queued {
            self.parked.push(job.query.clone());
            self.respond(job, Err(DispatchError::ShuttingDown));
        }
        self.dirty = true;
        self.update_gauges();
        Instant::now() + self.settings.shutdown_timeout
    }

    fn abandon_in_flight(&mut self) {
        let mut abandoned: Vec<Job> = self.in_flight.drain().map(|(_, job)| job).collect();
        abandoned.sort_by_key(|job| job.query.enqueued_at);
        for job in abandoned {
            self.parked.push(job.query.clone());
            self.respond(job, Err(DispatchError::ShuttingDown));
        }
        self.update_gauges();
    }

    /// Deliver a terminal outcome and count it. Only answers and upstream
    /// failures reach the success/failure counters.
    fn respond(&self, job: Job, outcome: Result<String, DispatchError>) {
        match &outcome {
            Ok(_) => self.stats.record_success(),
            Err(e) if e.is_failure() => self.stats.record_failure(),
            Err(_) => {}
        }
        match job.responder {
            Responder::Caller(tx) => {
                let _ = tx.send(outcome);
            }
            Responder::Recovered => match &self.recovered {
                Some(tx) => {
                    let _ = tx.send(RecoveredResult {
                        query: job.query,
                        outcome,
                    });
                }
                None => match outcome {
                    Ok(_) => info!(query_id = %job.query.id, "Recovered query answered"),
                    Err(e) => warn!(query_id = %job.query.id, error = %e, "Recovered query failed"),
                },
            },
        }
    }

    fn update_gauges(&self) {
        self.stats
            .set_gauges(self.queue.len(), self.in_flight.len());
    }

    /// Pending work in snapshot order: in-flight first (oldest first), then
    /// the queue, then anything parked by shutdown.
    fn pending_queries(&self) -> Vec<Query> {
        let mut in_flight: Vec<&Query> = self.in_flight.values().map(|job| &job.query).collect();
        in_flight.sort_by_key(|q| q.enqueued_at);
        in_flight
            .into_iter()
            .chain(self.queue.iter().map(|job| &job.query))
            .chain(self.parked.iter())
            .cloned()
            .collect()
    }

    fn flush_if_dirty(&mut self) {
        if self.dirty {
            self.flush();
            self.dirty = false;
        }
    }

    fn flush(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save_queue(&self.pending_queries()) {
            warn!(error = %e, "Failed to write queue snapshot");
        }
    }
}

async fn attempt(
    upstream: &Upstream,
    settings: &DispatcherSettings,
    query: &Query,
    cancel: Option<&CancellationToken>,
) -> AttemptOutcome {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return AttemptOutcome::Cancelled;
    }

    let bundle = upstream.selector.select(&query.text);
    let history = match query.conversation_key() {
        Some((user_id, channel_id)) => upstream.cache.history(user_id, channel_id).await,
        None => Vec::new(),
    };
    let prompt = upstream.prompts.build(&bundle, &history, &query.text);

    debug!(
        query_id = %query.id,
        attempt = query.retry_count + 1,
        topics = ?bundle.topics,
        general_knowledge = bundle.is_general_knowledge,
        history = history.len(),
        estimated_tokens = prompt.estimated_tokens,
        "Sending query upstream"
    );

    let request = ProviderRequest {
        model: settings.model.clone(),
        messages: prompt.messages,
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    };

    let result = match tokio::time::timeout(
        settings.attempt_timeout,
        upstream.provider.complete(request),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(format!(
            "no response within {}ms",
            settings.attempt_timeout.as_millis()
        ))),
    };

    let error = match result {
        Ok(response) => {
            let text = response.message.content.trim();
            return if text.is_empty() {
                AttemptOutcome::Empty
            } else {
                AttemptOutcome::Answered(text.to_string())
            };
        }
        Err(error) => error,
    };

    let kind = classify(&error);
    if kind == FailureKind::AuthFailure {
        upstream.raise_auth_alarm(&error);
    }
    let detail = error.to_string();

    if !kind.is_retryable() || query.retry_count >= settings.max_retries {
        return AttemptOutcome::Failed { kind, detail };
    }

    // The slot stays occupied through the backoff so a degraded upstream
    // sees less load, not more.
    let delay = settings.backoff(query.retry_count + 1);
    match cancel {
        Some(token) => {
            tokio::select! {
                _ = token.cancelled() => return AttemptOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        None => tokio::time::sleep(delay).await,
    }
    AttemptOutcome::Retry { kind, detail }
}
