//! `eventdesk ask` — Submit one question and print the answer.

use super::{CliResult, assistant_builder, load_config};
use eventdesk_agent::Reply;

pub async fn run(message: String, user: String, channel: Option<String>) -> CliResult {
    let config = load_config()?;
    let assistant = assistant_builder(&config)?.start().await;

    eprint!("  Thinking...");
    let result = assistant
        .submit_query(&message, &user, channel.as_deref(), None)
        .await;
    eprint!("\r              \r");

    match result {
        Ok(Reply::Answer(text)) => println!("{text}"),
        Ok(Reply::Deferred { retry_after }) => {
            println!(
                "You're asking a little fast, please wait {}s and try again.",
                retry_after.as_secs().max(1)
            );
        }
        Err(e) => {
            tracing::debug!(error = %e, "Query failed");
            println!("{}", assistant.failure_message(&e));
        }
    }

    assistant.shutdown().await;
    Ok(())
}
