//! Upstream failure taxonomy and classification.
//!
//! [`classify`] is the only place that inspects the shape of an upstream
//! error (status codes, message text). Everything downstream works with a
//! [`FailureKind`], which knows whether a retry is worthwhile and what to
//! tell the user once retries are exhausted.

use crate::error::ProviderError;
use serde::{Deserialize, Serialize};

/// Message fragments upstream services use when the prompt is too large.
const OVERSIZE_MARKERS: &[&str] = &[
    "context length",
    "context_length_exceeded",
    "maximum context",
    "too many tokens",
    "too long",
    "request too large",
];

/// Classified upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The upstream throttled us (HTTP 429).
    RateLimited,
    /// The call exceeded its wall-clock budget.
    Timeout,
    /// Credentials were rejected. Fatal to the request, not the process.
    AuthFailure,
    /// The prompt exceeded what the upstream accepts.
    OversizedInput,
    /// 5xx-class outage or transport failure.
    Unavailable,
    /// Any other client-side rejection.
    Rejected,
}

impl FailureKind {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::RateLimited | FailureKind::Timeout | FailureKind::Unavailable
        )
    }

    /// Plain-text message for the end user, ending with the contact fallback.
    pub fn user_message(self, contact: &str) -> String {
        let lead = match self {
            FailureKind::RateLimited => {
                "The system is busy answering a lot of questions right now, please try again in a few minutes."
            }
            FailureKind::Timeout => {
                "Generating an answer took too long, please try again shortly."
            }
            FailureKind::AuthFailure => {
                "I can't reach my answer service at the moment."
            }
            FailureKind::OversizedInput => {
                "That question is too long for me to handle, please simplify your question and try again."
            }
            FailureKind::Unavailable => {
                "The answer service is temporarily unavailable, please try again soon."
            }
            FailureKind::Rejected => "I couldn't process that question.",
        };
        format!("{lead} {contact}")
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Timeout => "timeout",
            FailureKind::AuthFailure => "auth_failure",
            FailureKind::OversizedInput => "oversized_input",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Map an upstream error onto the failure taxonomy.
pub fn classify(error: &ProviderError) -> FailureKind {
    match error {
        ProviderError::RateLimited { .. } => FailureKind::RateLimited,
        ProviderError::Timeout(_) => FailureKind::Timeout,
        ProviderError::AuthenticationFailed(_) => FailureKind::AuthFailure,
        ProviderError::ContextLengthExceeded(_) => FailureKind::OversizedInput,
        ProviderError::Network(_) => FailureKind::Unavailable,
        ProviderError::NotConfigured(_) => FailureKind::Rejected,
        ProviderError::ApiError {
            status_code,
            message,
        } => classify_status(*status_code, message),
    }
}

fn classify_status(status_code: u16, message: &str) -> FailureKind {
    match status_code {
        429 => FailureKind::RateLimited,
        401 | 403 => FailureKind::AuthFailure,
        408 | 504 => FailureKind::Timeout,
        413 => FailureKind::OversizedInput,
        500..=599 => FailureKind::Unavailable,
        _ if mentions_oversize(message) => FailureKind::OversizedInput,
        _ => FailureKind::Rejected,
    }
}

fn mentions_oversize(message: &str) -> bool {
    let lower = message.to_lowercase();
    OVERSIZE_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status_code: u16, message: &str) -> ProviderError {
        ProviderError::ApiError {
            status_code,
            message: message.into(),
        }
    }

    #[test]
    fn typed_variants_map_directly() {
        assert_eq!(
            classify(&ProviderError::RateLimited { retry_after_secs: 5 }),
            FailureKind::RateLimited
        );
        assert_eq!(
            classify(&ProviderError::Timeout("30s".into())),
            FailureKind::Timeout
        );
        assert_eq!(
            classify(&ProviderError::AuthenticationFailed("bad key".into())),
            FailureKind::AuthFailure
        );
        assert_eq!(
            classify(&ProviderError::Network("connection reset".into())),
            FailureKind::Unavailable
        );
    }

    #[test]
    fn status_codes_are_classified() {
        assert_eq!(classify(&api(429, "")), FailureKind::RateLimited);
        assert_eq!(classify(&api(403, "")), FailureKind::AuthFailure);
        assert_eq!(classify(&api(502, "bad gateway")), FailureKind::Unavailable);
        assert_eq!(classify(&api(504, "")), FailureKind::Timeout);
        assert_eq!(classify(&api(413, "")), FailureKind::OversizedInput);
        assert_eq!(classify(&api(404, "no such model")), FailureKind::Rejected);
    }

    #[test]
    fn oversize_detected_from_message_text() {
        let err = api(
            400,
            "This model's maximum context length is 8192 tokens. However, you requested 9000",
        );
        assert_eq!(classify(&err), FailureKind::OversizedInput);
    }

    #[test]
    fn retryability_follows_taxonomy() {
        assert!(FailureKind::RateLimited.is_retryable());
        assert!(FailureKind::Timeout.is_retryable());
        assert!(FailureKind::Unavailable.is_retryable());
        assert!(!FailureKind::AuthFailure.is_retryable());
        assert!(!FailureKind::OversizedInput.is_retryable());
        assert!(!FailureKind::Rejected.is_retryable());
    }

    #[test]
    fn user_messages_are_plain_text() {
        let msg = FailureKind::OversizedInput.user_message("Ask an organizer.");
        assert!(msg.contains("simplify your question"));
        assert!(msg.ends_with("Ask an organizer."));

        let busy = FailureKind::RateLimited.user_message("Ask an organizer.");
        assert!(busy.contains("busy"));
    }
}
