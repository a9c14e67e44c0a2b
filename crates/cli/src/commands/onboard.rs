//! `eventdesk onboard` — First-time setup.

use super::CliResult;
use eventdesk_config::AppConfig;

pub async fn run() -> CliResult {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("EventDesk — First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    // Paths come from the (possibly pre-existing) config.
    let config = AppConfig::load_from(&config_path)?;

    let document_path = config.knowledge.document_path();
    if document_path.exists() {
        println!("  Event document exists: {}", document_path.display());
    } else {
        if let Some(parent) = document_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&document_path, sample_event_document())?;
        println!("✅ Created sample event document: {}", document_path.display());
    }

    let state_dir = config.persistence.state_dir();
    if !state_dir.exists() {
        std::fs::create_dir_all(&state_dir)?;
        println!("✅ Created state directory: {}", state_dir.display());
    }

    println!("\n📝 Next steps:");
    println!("   1. Set EVENTDESK_API_KEY (or api_key under [upstream])");
    println!("   2. Replace the sample event document with your event's data");
    println!("   3. Try it: eventdesk ask \"what is the prize pool\"\n");

    Ok(())
}

/// A small but complete event document showing every section the context
/// selector knows about.
pub(crate) fn sample_event_document() -> String {
    let doc = serde_json::json!({
        "event": {
            "name": "Example Hackathon",
            "dates": "Saturday 09:00 to Sunday 17:00",
            "format": "In person, teams of up to 4"
        },
        "overview": "A 32-hour hackathon for students and early-career builders.",
        "contact": {
            "discord": "#help",
            "email": "organizers@example.org"
        },
        "schedule": [
            {"time": "Sat 09:00", "item": "Check-in and breakfast"},
            {"time": "Sat 10:00", "item": "Opening ceremony, hacking starts"},
            {"time": "Sat 12:30", "item": "Lunch"},
            {"time": "Sun 12:00", "item": "Submission deadline"},
            {"time": "Sun 15:30", "item": "Closing ceremony and awards"}
        ],
        "registration": {
            "opens": "Two weeks before the event",
            "link": "https://example.org/register",
            "eligibility": "Students and graduates of the last two years"
        },
        "teams": {"max_size": 4, "solo_allowed": true},
        "people": {
            "organizers": [{"name": "Sam Rivera", "role": "Lead organizer"}],
            "mentors": [{"name": "Priya Natarajan", "expertise": "Backend, Rust"}]
        },
        "judges": [
            {"name": "Dana Whitfield", "company": "Acme Cloud"},
            {"name": "Marcus Oyelaran", "company": "Initech"}
        ],
        "prizes": {
            "pool": "$10,000",
            "first": "$5,000",
            "second": "$3,000",
            "third": "$2,000"
        },
        "tracks": ["Climate", "Education", "Open Source"],
        "logistics": {
            "venue": "Main Hall, Example University",
            "wifi": "Example-Guest (password at the front desk)",
            "food": "All meals provided, vegetarian and vegan options available"
        },
        "statistics": {"participants": 300, "teams": 80, "countries": 12},
        "faq": [
            {"q": "Can I start my project before the event?", "a": "No, all code must be written during the event."},
            {"q": "Do I need a team?", "a": "No, you can work alone or find a team at the event."}
        ],
        "perks": ["Cloud credits", "T-shirts", "Stickers"],
        "background": "Run every year since 2019 by the student tech society.",
        "theme": "Build for your community",
        "sponsors": [{"name": "Acme Cloud", "tier": "gold"}, {"name": "Initech", "tier": "silver"}],
        "communities": [{"name": "Rust User Group"}, {"name": "Women in Tech Society"}]
    });
    serde_json::to_string_pretty(&doc).unwrap_or_default()
}
