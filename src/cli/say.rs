//! One-shot "say" command

use std::error::Error;
use std::io::{self, Write};

use crate::cli::cancel_on_ctrl_c;
use crate::core::chat_service::{ChatService, ExchangeOutcome};
use crate::core::chat_store::ChatStore;

/// Prints only the part of a cumulative reply that has not been shown yet.
#[derive(Debug, Default)]
pub struct ReplyPrinter {
    shown: String,
}

impl ReplyPrinter {
    /// Text to print for the new snapshot. If the reply was rewritten
    /// rather than extended, the whole snapshot is returned on a new line.
    pub fn advance(&mut self, text: &str) -> Option<String> {
        let output = match text.strip_prefix(self.shown.as_str()) {
            Some("") => return None,
            Some(suffix) => suffix.to_string(),
            None => format!("\n{text}"),
        };
        self.shown.clear();
        self.shown.push_str(text);
        Some(output)
    }

    pub fn print(&mut self, text: &str) {
        if let Some(output) = self.advance(text) {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(output.as_bytes());
            let _ = stdout.flush();
        }
    }

    pub fn has_output(&self) -> bool {
        !self.shown.is_empty()
    }
}

/// Print the ending of a streamed reply after its text.
pub(crate) fn report_outcome(printer: &ReplyPrinter, outcome: &ExchangeOutcome) {
    match outcome {
        ExchangeOutcome::Completed { .. } => println!(),
        ExchangeOutcome::Canceled { .. } => println!("\n[canceled]"),
        ExchangeOutcome::Failed { message } if printer.has_output() => {
            println!("\n[{message}]");
        }
        ExchangeOutcome::Failed { message } => eprintln!("❌ Error: {message}"),
    }
}

pub async fn run_say(service: &ChatService, prompt: String) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        eprintln!("Usage: chatweb say <prompt>");
        std::process::exit(1);
    }

    // A throwaway conversation: one-shot questions are not added to history.
    let mut store = ChatStore::new();
    let uuid = store.ensure_active();
    let mut printer = ReplyPrinter::default();
    let (cancel, watcher) = cancel_on_ctrl_c();

    let result = service
        .send(&mut store, uuid, &prompt, Some(cancel), |text| printer.print(text))
        .await;
    watcher.abort();

    let outcome = result?;
    report_outcome(&printer, &outcome);
    if matches!(outcome, ExchangeOutcome::Failed { .. }) {
        std::process::exit(1);
    }
    Ok(())
}
