//! `chatweb history`: saved conversations

use std::error::Error;

use chrono::Local;
use uuid::Uuid;

use crate::cli::HistoryCommand;
use crate::core::chat_store::ChatStore;
use crate::core::message::ChatEntry;

pub fn run_history(command: HistoryCommand) -> Result<(), Box<dyn Error>> {
    let mut store = ChatStore::load()?;

    match command {
        HistoryCommand::List => {
            let lines = list_lines(&store);
            if lines.is_empty() {
                println!("No conversations yet.");
            }
            for line in lines {
                println!("{line}");
            }
        }
        HistoryCommand::Show { index } => {
            let uuid = match index {
                Some(index) => conversation_at(&store, index)?,
                None => store.ensure_active(),
            };
            for entry in store.entries(uuid) {
                println!("{}", format_entry(entry));
                println!();
            }
        }
        HistoryCommand::Use { index } => {
            let uuid = conversation_at(&store, index)?;
            store.set_active(uuid);
            store.save()?;
            println!("✅ 'chatweb chat' will continue conversation {index}");
        }
        HistoryCommand::Rename { index, title } => {
            let uuid = conversation_at(&store, index)?;
            let title = title.join(" ");
            store.rename_conversation(uuid, title.as_str());
            store.save()?;
            println!("✅ Renamed conversation {index} to: {title}");
        }
        HistoryCommand::Delete { index } => {
            let uuid = conversation_at(&store, index)?;
            store.delete_conversation(uuid);
            store.save()?;
            println!("✅ Deleted conversation {index}");
        }
        HistoryCommand::Clear => {
            store.clear_all();
            store.save()?;
            println!("✅ Cleared chat history");
        }
    }
    Ok(())
}

/// Resolve a 1-based position from `history list`.
fn conversation_at(store: &ChatStore, index: usize) -> Result<Uuid, String> {
    index
        .checked_sub(1)
        .and_then(|position| store.conversations().get(position))
        .map(|conversation| conversation.uuid)
        .ok_or_else(|| {
            format!(
                "No conversation {index}; 'chatweb history list' shows {} conversation(s)",
                store.conversations().len()
            )
        })
}

pub(crate) fn list_lines(store: &ChatStore) -> Vec<String> {
    let active = store.active_uuid();
    store
        .conversations()
        .iter()
        .enumerate()
        .map(|(position, conversation)| {
            let marker = if Some(conversation.uuid) == active { '*' } else { ' ' };
            format!(
                "{marker} {:>3}. {} ({} messages)",
                position + 1,
                conversation.title,
                conversation.entries.len()
            )
        })
        .collect()
}

pub(crate) fn format_entry(entry: &ChatEntry) -> String {
    let when = entry
        .date_time
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M");
    let who = if entry.is_user() { "You" } else { "Assistant" };
    let flag = if entry.error { " [error]" } else { "" };
    format!("{who} · {when}{flag}\n{}", entry.text)
}
