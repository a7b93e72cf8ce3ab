mod commands;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gigi_chat::{ChatApi, ChatConfig, ChatStore, Identity, StaticIdentityProvider};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::commands::Session;

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal front-end for Gigi direct messages", long_about = None)]
struct Args {
    /// SQLite database file
    #[arg(short, long, default_value = "gigi-chat.db")]
    db: PathBuf,

    /// Profile id to act as
    #[arg(short, long)]
    user: String,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Messages per history page
    #[arg(long, default_value_t = 30)]
    page_size: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ChatConfig {
        db_path: args.db.clone(),
        default_page_size: args.page_size,
        ..Default::default()
    };
    let store = ChatStore::open(config)
        .await
        .with_context(|| format!("Failed to open chat database {}", args.db.display()))?;

    let identity = Identity::with_profile_id(args.user.clone());
    let api = Arc::new(ChatApi::new(
        store,
        Arc::new(StaticIdentityProvider::new(identity)),
    ));
    info!(user = %args.user, db = %args.db.display(), "Chat node started");

    println!("Signed in as {}. Type /help for commands.", args.user);
    let mut session = Session::new(api.clone(), args.user);
    let mut events = api.subscribe_events();

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    prompt();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let Err(e) = session.handle_event(event).await {
                            eprintln!("\n{}", e);
                            prompt();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            read = stdin.read_line(&mut line) => {
                if read.context("Failed to read stdin")? == 0 {
                    break;
                }
                let input = line.trim().to_string();
                line.clear();
                if input.is_empty() {
                    prompt();
                    continue;
                }

                let outcome = match input.strip_prefix('/') {
                    Some(command) => session.handle_command(command).await,
                    None => session.send_text(&input).await,
                };
                match outcome {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("{}", e),
                }
                prompt();
            }
        }
    }

    println!("Bye.");
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}
