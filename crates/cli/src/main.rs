//! EventDesk CLI — the main entry point.
//!
//! Commands:
//! - `onboard`  — Write a default config and a sample event document
//! - `ask`      — Submit a single question and print the answer
//! - `chat`     — Interactive question loop
//! - `status`   — Show configuration and persisted state
//! - `doctor`   — Diagnose setup problems

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "eventdesk",
    about = "EventDesk — help desk assistant for event chat servers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and a sample event document
    Onboard,

    /// Ask a single question
    Ask {
        /// The question text
        message: String,

        /// User the question is attributed to (rate limits are per user)
        #[arg(short, long, default_value = "cli-user")]
        user: String,

        /// Channel for conversation history; omit for a one-off question
        #[arg(short, long)]
        channel: Option<String>,
    },

    /// Interactive chat with conversation history
    Chat {
        #[arg(short, long, default_value = "cli-user")]
        user: String,

        #[arg(short, long, default_value = "cli")]
        channel: String,
    },

    /// Show configuration and persisted state
    Status,

    /// Diagnose setup problems
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Ask {
            message,
            user,
            channel,
        } => commands::ask::run(message, user, channel).await?,
        Commands::Chat { user, channel } => commands::chat::run(user, channel).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
