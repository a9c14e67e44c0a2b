//! `eventdesk status` — Show configuration and persisted state.

use super::{CliResult, load_config};
use eventdesk_config::AppConfig;
use eventdesk_memory::SnapshotStore;

pub async fn run() -> CliResult {
    let config = load_config()?;

    println!("EventDesk Status");
    println!("================");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Upstream:      {}", config.upstream.api_url);
    println!("  Model:         {}", config.upstream.model);
    println!("  API key:       {}", if config.has_api_key() { "set" } else { "missing" });
    println!(
        "  Admission:     {}s cooldown, {} per {}s",
        config.admission.cooldown_secs, config.admission.max_per_window, config.admission.window_secs
    );
    println!(
        "  Dispatcher:    {} concurrent, {} retries, {}s timeout",
        config.dispatcher.max_concurrency, config.dispatcher.max_retries, config.upstream.timeout_secs
    );
    println!(
        "  Conversations: {} kept, {} replayed, {} min TTL",
        config.conversation.max_entries,
        config.conversation.history_window,
        config.conversation.ttl_minutes
    );
    println!("  Event data:    {}", config.knowledge.document_path().display());

    if config.persistence.enabled {
        let store = SnapshotStore::new(config.persistence.state_dir());
        let queue = store.load_queue();
        let cache = store.load_cache();
        println!("  State dir:     {}", store.dir().display());
        println!("  Pending:       {} queued queries", queue.len());
        for query in queue.iter().take(5) {
            println!(
                "                 - [{}] {} (retries: {})",
                query.user_id, query.text, query.retry_count
            );
        }
        println!("  Remembered:    {} conversations", cache.len());
    } else {
        println!("  Persistence:   disabled");
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `eventdesk onboard` first");
    }

    Ok(())
}
