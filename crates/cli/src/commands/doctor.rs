//! `eventdesk doctor` — Diagnose setup problems.

use super::CliResult;
use eventdesk_agent::EventDocument;
use eventdesk_config::AppConfig;
use eventdesk_core::Provider;
use eventdesk_providers::OpenAiCompatProvider;

pub async fn run() -> CliResult {
    println!("EventDesk Doctor — Setup Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults — run `eventdesk onboard`");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config file invalid: {e}");
            println!("\n  ⚠️  {} issue(s) found. See above for details.", issues + 1);
            return Ok(());
        }
    };

    // Event document
    let document_path = config.knowledge.document_path();
    if !document_path.exists() {
        println!("  ⚠️  No event document at {}", document_path.display());
        issues += 1;
    } else {
        let document = EventDocument::load(&document_path);
        if document.is_empty() {
            println!("  ❌ Event document is empty or not a JSON object");
            issues += 1;
        } else {
            let sections: Vec<&str> = document.section_names().collect();
            println!(
                "  ✅ Event document: {} sections, {} known names",
                sections.len(),
                document.entities().len()
            );
        }
    }

    // Persisted state
    if config.persistence.enabled {
        let state_dir = config.persistence.state_dir();
        for file in ["queue.json", "conversations.json"] {
            let path = state_dir.join(file);
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<serde_json::Value>(&content) {
                    Ok(_) => println!("  ✅ {file} readable"),
                    Err(e) => {
                        println!("  ❌ {file} is malformed and will be ignored: {e}");
                        issues += 1;
                    }
                },
                Err(_) => println!("  ·  {file} not written yet"),
            }
        }
    }

    // Upstream
    if !config.has_api_key() {
        println!("  ⚠️  No API key configured — set EVENTDESK_API_KEY or [upstream].api_key");
        issues += 1;
    } else {
        let provider = OpenAiCompatProvider::from_config(&config.upstream)?;
        match provider.health_check().await {
            Ok(true) => println!("  ✅ Upstream reachable at {}", config.upstream.api_url),
            Ok(false) => {
                println!("  ⚠️  Upstream answered but reported a problem");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Upstream check failed: {e}");
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
