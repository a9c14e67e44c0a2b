//! Subcommand implementations and the shared startup path.

pub mod ask;
pub mod chat;
pub mod doctor;
pub mod onboard;
pub mod status;

use eventdesk_agent::{Assistant, AssistantBuilder, EventDocument};
use eventdesk_config::AppConfig;
use eventdesk_memory::SnapshotStore;
use eventdesk_providers::OpenAiCompatProvider;
use std::sync::Arc;

pub(crate) type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub(crate) fn load_config() -> CliResult<AppConfig> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Build the assistant from config: upstream client, event document and,
/// when enabled, the snapshot store.
pub(crate) fn assistant_builder(config: &AppConfig) -> CliResult<AssistantBuilder> {
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    EVENTDESK_API_KEY = 'sk-...'");
        eprintln!("    OPENAI_API_KEY    = 'sk-...'");
        eprintln!();
        eprintln!("  Or add `api_key` under [upstream] in:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = OpenAiCompatProvider::from_config(&config.upstream)?;
    let document = EventDocument::load(&config.knowledge.document_path());

    let mut builder =
        Assistant::builder(config.clone(), Arc::new(provider)).with_document(document);
    if config.persistence.enabled {
        builder = builder.with_store(SnapshotStore::new(config.persistence.state_dir()));
    }
    Ok(builder)
}
