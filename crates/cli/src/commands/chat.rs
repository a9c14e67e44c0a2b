//! `eventdesk chat` — Interactive question loop.
//!
//! Every line is submitted as a query from `user` in `channel`, so
//! follow-up questions see the conversation history. Slash commands:
//! `/clear` forgets the conversation, `/stats` prints dispatcher stats.

use super::{CliResult, assistant_builder, load_config};
use eventdesk_agent::Reply;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub async fn run(user: String, channel: String) -> CliResult {
    let config = load_config()?;

    let (recovered_tx, mut recovered_rx) = mpsc::unbounded_channel();
    let assistant = assistant_builder(&config)?
        .with_recovered_results(recovered_tx)
        .start()
        .await;

    // Answers to questions left over from a previous run.
    let contact = assistant.contact_fallback().to_string();
    tokio::spawn(async move {
        while let Some(result) = recovered_rx.recv().await {
            let text = match result.outcome {
                Ok(answer) => answer,
                Err(e) => e.user_message(&contact),
            };
            println!();
            println!("  [earlier question] {}", result.query.text);
            for line in text.lines() {
                println!("  Assistant > {line}");
            }
        }
    });

    println!();
    println!("  EventDesk — Interactive Mode");
    println!();
    println!("  Model:     {}", config.upstream.model);
    println!("  User:      {user}");
    println!("  Channel:   {channel}");
    println!();
    println!("  Type your question and press Enter.");
    println!("  /clear forgets the conversation, /stats shows queue stats.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "exit" | "quit" => break,
            "/clear" => {
                if assistant.clear_conversation(&user, &channel).await {
                    println!("  Conversation cleared.");
                } else {
                    println!("  Nothing to clear.");
                }
            }
            "/stats" => {
                let stats = assistant.stats().await;
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            question => {
                eprint!("  ...");
                let result = assistant
                    .submit_query(question, &user, Some(&channel), None)
                    .await;
                eprint!("\r     \r");
                println!();
                match result {
                    Ok(Reply::Answer(text)) => {
                        for line in text.lines() {
                            println!("  Assistant > {line}");
                        }
                    }
                    Ok(Reply::Deferred { retry_after }) => {
                        println!(
                            "  [Slow down] try again in {}s",
                            retry_after.as_secs().max(1)
                        );
                    }
                    Err(e) => println!("  [Error] {}", assistant.failure_message(&e)),
                }
                println!();
            }
        }
        prompt()?;
    }

    println!();
    assistant.shutdown().await;
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}
