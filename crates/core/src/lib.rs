//! # EventDesk Core
//!
//! Domain types, traits, and error definitions shared by every EventDesk
//! crate. Nothing in here performs I/O: the upstream client, the caches and
//! the dispatcher all live in their own crates and depend inward on this one.

pub mod error;
pub mod failure;
pub mod message;
pub mod provider;
pub mod query;

// Re-export key types at crate root for ergonomics
pub use error::{DispatchError, PersistenceError, ProviderError};
pub use failure::{FailureKind, classify};
pub use message::{ConversationEntry, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use query::{Query, QueryId};
