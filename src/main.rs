//! remotecall - console client for the RC remote command protocol
//!
//! Keeps an authenticated session to the server, prints everything the
//! server sends and reads commands from an interactive prompt.

mod commands;
mod repl;

use clap::Parser;
use colored::Colorize;
use remotecall_client::{Config, Session, SessionEvent};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config/default.json";

#[derive(Parser)]
#[command(name = "remotecall")]
#[command(about = "Console client for the RC remote command protocol")]
#[command(version)]
struct Cli {
    /// JSON config file (defaults to config/default.json when present)
    #[arg(short, long, env = "REMOTECALL_CONFIG")]
    config: Option<PathBuf>,

    /// Server address (host:port), overrides the config file
    #[arg(short, long)]
    server: Option<String>,

    /// Server password, overrides the config file
    #[arg(short, long, env = "REMOTECALL_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.or_else(|| {
        let default = Path::new(DEFAULT_CONFIG_PATH);
        default.exists().then(|| default.to_path_buf())
    });

    let mut config = Config::read(config_path.as_deref()).map_err(|e| {
        eprintln!("{}: {}", "Config error".red(), e);
        e
    })?;
    if let Some(server) = cli.server {
        config.server = server;
    }
    if let Some(password) = cli.password {
        config.password = password;
    }
    config.validate().map_err(|e| {
        eprintln!("{}: {}", "Config error".red(), e);
        e
    })?;

    if let Some(path) = &config_path {
        tracing::info!("loaded config from {}", path.display());
    }

    let (client, events, session) = Session::spawn(config.session_config());
    let printer = tokio::spawn(print_events(events));

    repl::run(client, &config.server).await?;

    // The session only notices dropped clients while logged in.
    session.abort();
    let _ = printer.await;

    Ok(())
}

/// Prints session events until the session goes away.
async fn print_events(mut events: mpsc::Receiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        if event.is_terminal() {
            println!("{}", event.to_string().red().bold());
            break;
        }
        match &event {
            SessionEvent::Error(_)
            | SessionEvent::ConnectFailed { .. }
            | SessionEvent::Disconnected { .. } => {
                println!("{}", event.to_string().yellow());
            }
            SessionEvent::QueryResult { content, .. } => {
                println!("{}", content.cyan());
            }
            _ => println!("{}", event.to_string().cyan()),
        }
    }
}
