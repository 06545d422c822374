//! Line-based interactive chat

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use uuid::Uuid;

use crate::cli::cancel_on_ctrl_c;
use crate::cli::say::{report_outcome, ReplyPrinter};
use crate::core::chat_service::{ChatError, ChatService};
use crate::core::chat_store::ChatStore;
use crate::core::message::{ChatEntry, NEW_CHAT_TITLE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    New,
    Retry,
    Help,
    Quit,
    Unknown(String),
}

impl ReplCommand {
    /// `None` means the line is a prompt.
    pub fn parse(line: &str) -> Option<Self> {
        let command = line.trim().strip_prefix('/')?;
        let name = command.split_whitespace().next().unwrap_or_default();
        Some(match name.to_ascii_lowercase().as_str() {
            "new" => ReplCommand::New,
            "retry" | "regenerate" => ReplCommand::Retry,
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" | "q" => ReplCommand::Quit,
            _ => ReplCommand::Unknown(name.to_string()),
        })
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /new     Start a new conversation");
    println!("  /retry   Regenerate the last reply");
    println!("  /help    Show this help");
    println!("  /quit    Leave the chat (Ctrl+D works too)");
    println!("Ctrl+C cancels a reply while it is streaming.");
}

fn prompt_marker() {
    print!("› ");
    let _ = io::stdout().flush();
}

fn load_history() -> ChatStore {
    match ChatStore::load() {
        Ok(store) => store,
        Err(err) => {
            warn!(error = %err, "Starting with empty history");
            eprintln!("⚠️  {err}");
            eprintln!("Starting with an empty history.");
            ChatStore::new()
        }
    }
}

fn save_history(store: &ChatStore) {
    if let Err(err) = store.save() {
        warn!(error = %err, "Failed to save history");
        eprintln!("⚠️  {err}");
    }
}

pub async fn run_chat(service: &ChatService) -> Result<(), Box<dyn Error>> {
    let mut store = load_history();
    let mut uuid = store.ensure_active();

    println!("Connected to {}", service.client().base_url());
    if let Some(conversation) = store.conversation(uuid) {
        if !conversation.entries.is_empty() {
            println!(
                "Continuing \"{}\" ({} messages). /new starts over.",
                conversation.title,
                conversation.entries.len()
            );
        }
    }
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt_marker();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let result = match ReplCommand::parse(input) {
            Some(ReplCommand::Quit) => break,
            Some(ReplCommand::Help) => {
                print_help();
                continue;
            }
            Some(ReplCommand::Unknown(name)) => {
                eprintln!("Unknown command: /{name} (try /help)");
                continue;
            }
            Some(ReplCommand::New) => {
                uuid = store.add_conversation(NEW_CHAT_TITLE);
                println!("Started a new conversation.");
                save_history(&store);
                continue;
            }
            Some(ReplCommand::Retry) => retry_last(service, &mut store, uuid).await,
            None => ask(service, &mut store, uuid, input).await,
        };

        save_history(&store);
        result?;
    }

    save_history(&store);
    Ok(())
}

async fn ask(
    service: &ChatService,
    store: &mut ChatStore,
    uuid: Uuid,
    prompt: &str,
) -> Result<(), ChatError> {
    let mut printer = ReplyPrinter::default();
    let (cancel, watcher) = cancel_on_ctrl_c();
    let result = service
        .send(store, uuid, prompt, Some(cancel), |text| printer.print(text))
        .await;
    watcher.abort();

    let outcome = result?;
    report_outcome(&printer, &outcome);
    Ok(())
}

async fn retry_last(
    service: &ChatService,
    store: &mut ChatStore,
    uuid: Uuid,
) -> Result<(), ChatError> {
    let Some(index) = store.entries(uuid).iter().rposition(ChatEntry::is_assistant) else {
        eprintln!("Nothing to regenerate yet.");
        return Ok(());
    };

    let mut printer = ReplyPrinter::default();
    let (cancel, watcher) = cancel_on_ctrl_c();
    let result = service
        .regenerate(store, uuid, index, Some(cancel), |text| printer.print(text))
        .await;
    watcher.abort();

    let outcome = result?;
    report_outcome(&printer, &outcome);
    Ok(())
}
