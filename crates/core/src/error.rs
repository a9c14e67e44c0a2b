//! Error types for the EventDesk domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use crate::failure::FailureKind;
use thiserror::Error;

// --- Bounded context errors ---

/// Errors raised by the upstream completion service adapter.
///
/// These are wire-level shapes. The dispatcher never matches on them
/// directly; it runs them through [`crate::failure::classify`].
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Input exceeds the model context: {0}")]
    ContextLengthExceeded(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors from the snapshot store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to write snapshot {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Failed to encode snapshot: {0}")]
    Encode(String),
}

/// Terminal outcomes that reject a caller's pending query.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("Upstream failure ({kind}): {detail}")]
    Upstream { kind: FailureKind, detail: String },

    #[error("Query was cancelled before it reached the upstream service")]
    Cancelled,

    #[error("Dispatcher is shutting down")]
    ShuttingDown,

    #[error("Dispatcher is no longer running")]
    Closed,
}

impl DispatchError {
    /// Plain-text message suitable for showing to the end user.
    ///
    /// Always ends with the human-contact fallback.
    pub fn user_message(&self, contact: &str) -> String {
        match self {
            DispatchError::Upstream { kind, .. } => kind.user_message(contact),
            DispatchError::Cancelled => {
                format!("Your question was cancelled before I could answer it. {contact}")
            }
            DispatchError::ShuttingDown | DispatchError::Closed => format!(
                "I'm restarting right now, please ask again in a minute. {contact}"
            ),
        }
    }

    /// Whether this rejection counts toward the failure statistics.
    pub fn is_failure(&self) -> bool {
        matches!(self, DispatchError::Upstream { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ProviderError::ApiError {
            status_code: 503,
            message: "Service Unavailable".into(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("Service Unavailable"));
    }

    #[test]
    fn dispatch_message_carries_contact_fallback() {
        let contact = "Ping @organizers in #help.";
        for err in [
            DispatchError::Cancelled,
            DispatchError::ShuttingDown,
            DispatchError::Upstream {
                kind: FailureKind::Timeout,
                detail: "slow".into(),
            },
        ] {
            assert!(err.user_message(contact).ends_with(contact));
        }
    }

    #[test]
    fn only_upstream_rejections_are_failures() {
        assert!(!DispatchError::Cancelled.is_failure());
        assert!(!DispatchError::ShuttingDown.is_failure());
        assert!(
            DispatchError::Upstream {
                kind: FailureKind::AuthFailure,
                detail: String::new(),
            }
            .is_failure()
        );
    }
}
