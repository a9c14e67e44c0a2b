//! Upstream completion service clients for EventDesk.
//!
//! All clients implement the `eventdesk_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
