//! The query pipeline for EventDesk.
//!
//! 1. **Admit** the query through the per-user rate limiter
//! 2. **Enqueue** it on the dispatcher (FIFO, bounded concurrency)
//! 3. **Select context**: the slice of the event document the query needs
//! 4. **Send** system prompt + conversation history + query upstream
//! 5. **Resolve** the caller, or requeue after a retryable failure
//!
//! Queue and conversation state are snapshotted to disk and restored on
//! the next start.

pub mod assistant;
pub mod context;
pub mod dispatcher;
pub mod stats;

pub use assistant::{Assistant, AssistantBuilder, Reply, SubmitOptions};
pub use context::{ContextBundle, ContextSelector, EventDocument, PromptBuilder};
pub use dispatcher::{
    Dispatcher, DispatcherHandle, DispatcherSettings, EMPTY_RESPONSE_MESSAGE, PendingAnswer,
    RecoveredResult,
};
pub use stats::{DispatcherStats, StatsRecorder};
