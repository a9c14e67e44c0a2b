//! Context selection and prompt assembly.
//!
//! The [`ContextSelector`] picks the sections of the [`EventDocument`] a
//! query needs; the [`PromptBuilder`] wraps that bundle, the remembered
//! conversation and the query text into upstream messages.

pub mod knowledge;
pub mod prompt;
pub mod selector;

pub use knowledge::{Entity, EventDocument};
pub use prompt::{Prompt, PromptBuilder, estimate_tokens};
pub use selector::{ContextBundle, ContextSelector, GENERAL_TOPIC};
