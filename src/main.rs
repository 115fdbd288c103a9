//! Draftsmith CLI entry point.
//!
//! `chat` runs the interactive drafting session, `show` prints the current
//! document, `reset` clears the saved conversation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use draftsmith::config::DraftConfig;
use draftsmith::conversation::state::{ConversationState, Lifecycle, Role, CLARIFICATION_CAP};
use draftsmith::conversation::store::{NullStore, SnapshotStore, SqliteStore};
use draftsmith::conversation::Conversation;
use draftsmith::credentials;
use draftsmith::logging;
use draftsmith::service::HttpDraftService;

/// Draftsmith — turn a product idea into a requirements document.
#[derive(Parser)]
#[command(name = "draftsmith", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the interactive drafting session.
    Chat,
    /// Print the finished document as markdown and exit.
    Show,
    /// Clear the saved conversation.
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Chat => handle_chat().await,
        Command::Show => handle_show().await,
        Command::Reset => handle_reset().await,
    }
}

/// Run the interactive drafting session.
async fn handle_chat() -> anyhow::Result<()> {
    let config = DraftConfig::load().context("failed to load configuration")?;
    let credentials = credentials::load_default_credentials()?;
    let api_key = credentials.api_key()?;

    let logs_dir = config.paths.logs_dir_path()?;
    let _logging_guard = logging::init_chat(&logs_dir, &config.log.level)?;

    let store = open_store(&config).await;
    let backend = Arc::new(HttpDraftService::new(
        config.service.base_url.clone(),
        api_key,
    ));
    let mut conversation = Conversation::restore(backend, store).await;

    println!("draftsmith — describe a product idea and I'll draft its requirements.");
    println!("Commands: /retry  /edit  /new  /show  /quit");
    println!();
    print_transcript(conversation.state());
    print_outcome(conversation.state());

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        prompt()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => {}
            "/quit" | "/exit" => break,
            "/new" => {
                conversation.start_over().await;
                println!("Conversation cleared. Describe a new idea.");
            }
            "/retry" => {
                conversation.retry().await;
                print_outcome(conversation.state());
            }
            "/edit" => {
                conversation.edit_and_regenerate().await;
                let idea = &conversation.state().original_idea;
                if idea.is_empty() {
                    println!("Nothing to edit yet.");
                } else {
                    println!("Your idea so far:\n  {idea}");
                    println!("Type an updated version to regenerate.");
                }
            }
            "/show" => print_document(conversation.state()),
            text => {
                if conversation.state().lifecycle == Lifecycle::Complete {
                    println!("Document is finished. Use /edit to rework it or /new to start over.");
                    continue;
                }
                println!("Thinking...");
                conversation.send(text).await;
                print_outcome(conversation.state());
            }
        }
    }

    Ok(())
}

/// Print the finished document from the saved conversation.
async fn handle_show() -> anyhow::Result<()> {
    logging::init_cli();
    let config = DraftConfig::load().context("failed to load configuration")?;

    let path = config.paths.snapshot_db_path()?;
    let store = SqliteStore::open(&path)
        .await
        .context("failed to open the snapshot store")?;

    match store.load().await.and_then(|s| s.document) {
        Some(document) => println!("{}", document.to_markdown()),
        None => println!("No finished document. Run `draftsmith chat` first."),
    }
    Ok(())
}

/// Clear the saved conversation.
async fn handle_reset() -> anyhow::Result<()> {
    logging::init_cli();
    let config = DraftConfig::load().context("failed to load configuration")?;

    let path = config.paths.snapshot_db_path()?;
    let store = SqliteStore::open(&path)
        .await
        .context("failed to open the snapshot store")?;
    store.clear().await;

    println!("Saved conversation cleared.");
    Ok(())
}

/// Open the SQLite store, falling back to no persistence rather than aborting.
async fn open_store(config: &DraftConfig) -> Arc<dyn SnapshotStore> {
    let path = match config.paths.snapshot_db_path() {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "no usable snapshot path, continuing without persistence");
            return Arc::new(NullStore);
        }
    };
    match SqliteStore::open(&path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(error = %e, "snapshot store unavailable, continuing without persistence");
            Arc::new(NullStore)
        }
    }
}

fn prompt() -> anyhow::Result<()> {
    print!("> ");
    std::io::stdout().flush().context("failed to flush stdout")?;
    Ok(())
}

/// Replay the restored transcript so the user sees where they left off.
fn print_transcript(state: &ConversationState) {
    for turn in &state.turns {
        match turn.role {
            Role::User => println!("you: {}", turn.content),
            Role::Assistant => println!("draftsmith: {}", turn.content),
        }
        println!();
    }
}

/// Describe the state reached after an operation.
fn print_outcome(state: &ConversationState) {
    match state.lifecycle {
        Lifecycle::AwaitingClarification => {
            if let Some(turn) = state.turns.last() {
                println!(
                    "draftsmith asks (round {} of {}):",
                    state.clarification_round, CLARIFICATION_CAP
                );
                println!("{}", turn.content);
            }
        }
        Lifecycle::Complete => {
            println!("Document ready. Showing it below; /edit reworks it, /new starts fresh.");
            println!();
            print_document(state);
        }
        Lifecycle::Failed => {
            if let Some(failure) = &state.failure {
                println!("{}", failure.message);
                if failure.retryable {
                    println!("(/retry to try again, /new to start over)");
                }
            }
        }
        Lifecycle::Idle | Lifecycle::AwaitingResponse => {}
    }
}

fn print_document(state: &ConversationState) {
    match &state.document {
        Some(document) => println!("{}", document.to_markdown()),
        None => println!("No finished document yet."),
    }
}
