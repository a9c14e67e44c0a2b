//! Provider trait — the abstraction over the upstream completion service.
//!
//! The dispatcher sends each assembled prompt through a `Provider` and
//! classifies whatever error comes back. Implementations: the
//! OpenAI-compatible HTTP client, plus scripted mocks in tests.

use crate::error::ProviderError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The prompt messages, system message first
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The upstream completion service.
///
/// Implementations must be cheap to share behind an `Arc`: the dispatcher
/// calls `complete()` from many concurrent attempts.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            let last = request.messages.last().map(|m| m.content.clone());
            Ok(ProviderResponse {
                message: Message::assistant(last.unwrap_or_default()),
                usage: None,
                model: request.model,
            })
        }
    }

    #[test]
    fn request_temperature_default() {
        let req: ProviderRequest =
            serde_json::from_str(r#"{"model":"m","messages":[]}"#).unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(req.max_tokens.is_none());
    }

    #[tokio::test]
    async fn default_health_check_is_healthy() {
        let echo = Echo;
        assert!(echo.health_check().await.unwrap());
        let resp = echo
            .complete(ProviderRequest {
                model: "m".into(),
                messages: vec![Message::user("ping")],
                temperature: 0.0,
                max_tokens: None,
            })
            .await
            .unwrap();
        assert_eq!(resp.message.content, "ping");
    }
}
