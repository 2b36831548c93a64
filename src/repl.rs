//! Interactive console.

use crate::commands::{self, ReplCommand, HELP_TEXT};
use colored::Colorize;
use remotecall_client::{Client, SessionState};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use std::path::PathBuf;

const HISTORY_FILE: &str = ".remotecall_history";

pub async fn run(client: Client, server: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "remotecall console".bold().cyan());
    println!("Session to {} started ({}).", server, client.state());

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = home::home_dir()
        .map(|h| h.join(HISTORY_FILE))
        .unwrap_or_else(|| PathBuf::from(HISTORY_FILE));
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "rc>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let command = match commands::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        println!("{}\n", e);
                        continue;
                    }
                };

                match execute(&client, command).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    println!("{}", "Bye.".dimmed());

    Ok(())
}

/// Runs one command. `Ok(None)` means exit.
async fn execute(
    client: &Client,
    command: ReplCommand,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    match command {
        ReplCommand::Help => Ok(Some(HELP_TEXT.to_string())),

        ReplCommand::Quit => Ok(None),

        ReplCommand::State => Ok(Some(format_state(client.state()))),

        ReplCommand::Login(password) => {
            client.submit_handshake(password).await?;
            Ok(Some(format!("{} handshake", "Queued".green())))
        }

        ReplCommand::QueryLength(len) => {
            client.submit_query_content_length(len).await?;
            Ok(Some(format!("{} content length {}", "Queued".green(), len)))
        }

        ReplCommand::Query(text) => {
            let len = text.len();
            client.submit_query(text).await?;
            Ok(Some(format!("{} query ({} bytes)", "Queued".green(), len)))
        }

        ReplCommand::QueryFile(path) => {
            let content = tokio::fs::read(&path).await?;
            let len = content.len();
            if client.state() != SessionState::Ready {
                println!("{}", "Waiting for login...".dimmed());
            }
            let chunks = client.send_content(content).await?;
            Ok(Some(format!(
                "{} {} ({} bytes in {} chunks)",
                "Sent".green(),
                path.display().to_string().cyan(),
                len,
                chunks
            )))
        }
    }
}

fn format_state(state: SessionState) -> String {
    let label = state.to_string();
    match state {
        SessionState::Ready => label.green().to_string(),
        SessionState::Terminated => label.red().to_string(),
        _ => label.yellow().to_string(),
    }
}
