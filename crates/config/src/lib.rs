//! Configuration loading, validation, and management for EventDesk.
//!
//! Loads configuration from `~/.eventdesk/config.toml` with environment
//! variable overrides. Validates all settings at startup. Every field has a
//! default, so a missing file yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.eventdesk/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream completion service
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Per-user admission limits
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Queue engine and worker pool
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Short-lived conversation history
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Snapshot persistence
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Event document and prompt text
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Wall-clock budget for a single upstream call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    30
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Minimum gap between two admitted requests from one user
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Sliding window length
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Admitted requests allowed per user inside one window
    #[serde(default = "default_max_per_window")]
    pub max_per_window: usize,

    /// Tracked-user high-water mark that triggers eviction
    #[serde(default = "default_max_tracked_users")]
    pub max_tracked_users: usize,

    /// Upper bound on records evicted in one pass
    #[serde(default = "default_eviction_batch")]
    pub eviction_batch: usize,
}

fn default_cooldown_secs() -> u64 {
    5
}
fn default_window_secs() -> u64 {
    60
}
fn default_max_per_window() -> usize {
    5
}
fn default_max_tracked_users() -> usize {
    10_000
}
fn default_eviction_batch() -> usize {
    100
}

impl AdmissionConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            window_secs: default_window_secs(),
            max_per_window: default_max_per_window(),
            max_tracked_users: default_max_tracked_users(),
            eviction_batch: default_eviction_batch(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Worker-pool size: upper bound on concurrent upstream calls
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Requeues allowed per query after retryable failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// How long shutdown waits for in-flight queries
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Debounce interval for queue snapshots
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
}

fn default_max_concurrency() -> usize {
    3
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_backoff_max_ms() -> u64 {
    8_000
}
fn default_shutdown_timeout_secs() -> u64 {
    30
}
fn default_snapshot_interval_secs() -> u64 {
    5
}

impl DispatcherConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Entries kept per conversation
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Entries replayed into each prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Inactivity after which a conversation is forgotten
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_entries() -> usize {
    10
}
fn default_history_window() -> usize {
    6
}
fn default_ttl_minutes() -> u64 {
    30
}
fn default_sweep_interval_secs() -> u64 {
    300
}

impl ConversationConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            history_window: default_history_window(),
            ttl_minutes: default_ttl_minutes(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory holding `queue.json` and `conversations.json`.
    /// Defaults to `~/.eventdesk/state`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl PersistenceConfig {
    pub fn state_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("state"))
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// JSON event document. Defaults to `~/.eventdesk/event.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_path: Option<PathBuf>,

    /// Base instructions placed at the top of every prompt
    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// Appended to every user-visible failure
    #[serde(default = "default_contact_fallback")]
    pub contact_fallback: String,
}

fn default_instructions() -> String {
    concat!(
        "You are the help desk assistant for a hackathon. ",
        "Answer using the event data provided below when it is relevant. ",
        "If the data does not contain the answer, say so and suggest contacting an organizer. ",
        "Keep answers short and friendly."
    )
    .into()
}
fn default_contact_fallback() -> String {
    "If you need a human, reach out to an organizer in the #help channel.".into()
}

impl KnowledgeConfig {
    pub fn document_path(&self) -> PathBuf {
        self.document_path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("event.json"))
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            document_path: None,
            instructions: default_instructions(),
            contact_fallback: default_contact_fallback(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.eventdesk/config.toml).
    ///
    /// Environment overrides:
    /// - `EVENTDESK_API_KEY` then `OPENAI_API_KEY` (when no key is configured)
    /// - `EVENTDESK_API_URL`
    /// - `EVENTDESK_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.upstream.api_key.is_none() {
            self.upstream.api_key = std::env::var("EVENTDESK_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("EVENTDESK_API_URL") {
            self.upstream.api_url = url;
        }

        if let Ok(model) = std::env::var("EVENTDESK_MODEL") {
            self.upstream.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".eventdesk")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.temperature < 0.0 || self.upstream.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "upstream.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "upstream.timeout_secs must be > 0".into(),
            ));
        }

        if self.dispatcher.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "dispatcher.max_concurrency must be > 0".into(),
            ));
        }

        if self.dispatcher.backoff_base_ms > self.dispatcher.backoff_max_ms {
            return Err(ConfigError::ValidationError(
                "dispatcher.backoff_base_ms must not exceed backoff_max_ms".into(),
            ));
        }

        if self.admission.window_secs == 0 || self.admission.max_per_window == 0 {
            return Err(ConfigError::ValidationError(
                "admission.window_secs and max_per_window must be > 0".into(),
            ));
        }

        if self.conversation.max_entries == 0
            || self.conversation.history_window > self.conversation.max_entries
        {
            return Err(ConfigError::ValidationError(
                "conversation.history_window must be between 0 and max_entries (> 0)".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.upstream.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatcher.max_retries, 3);
        assert_eq!(config.conversation.max_entries, 10);
        assert_eq!(config.conversation.history_window, 6);
        assert_eq!(config.conversation.ttl(), Duration::from_secs(30 * 60));
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.upstream.model, config.upstream.model);
        assert_eq!(
            parsed.admission.max_per_window,
            config.admission.max_per_window
        );
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = AppConfig::default();
        config.dispatcher.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn history_window_larger_than_entries_rejected() {
        let mut config = AppConfig::default();
        config.conversation.history_window = 12;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        let config = result.unwrap();
        assert_eq!(config.upstream.model, "gpt-4o-mini");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "[admission]\ncooldown_secs = 2\n\n[dispatcher]\nmax_concurrency = 8\n"
        )
        .unwrap();

        let config = AppConfig::load_from(tmp.path()).unwrap();
        assert_eq!(config.admission.cooldown(), Duration::from_secs(2));
        assert_eq!(config.admission.window_secs, 60);
        assert_eq!(config.dispatcher.max_concurrency, 8);
        assert_eq!(config.dispatcher.max_retries, 3);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[dispatcher\nmax_concurrency = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(tmp.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn huge_ttl_saturates() {
        let conversation = ConversationConfig {
            ttl_minutes: u64::MAX,
            ..ConversationConfig::default()
        };
        assert_eq!(conversation.ttl(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn api_key_is_redacted_in_debug() {
        let mut config = AppConfig::default();
        config.upstream.api_key = Some("sk-very-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("[dispatcher]"));
    }
}
