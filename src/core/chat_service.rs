//! One question/answer exchange against `/chat-process`.
//!
//! [`ChatService::send`] records the prompt and an assistant placeholder in
//! the [`ChatStore`], streams the reply into that placeholder as it arrives,
//! and settles the entry once the request ends, however it ends.

use memchr::memrchr;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::endpoints::{fetch_chat_process, ChatProcessParams};
use crate::api::{ChatLine, ConversationOptions};
use crate::core::chat_store::ChatStore;
use crate::core::config::{Config, Settings};
use crate::core::message::{ChatEntry, ChatEntryPatch};
use crate::http::{HttpClient, ProgressEvent, RequestError};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("No conversation with id {0}")]
    UnknownConversation(Uuid),

    #[error("No assistant reply at position {index} in conversation {uuid}")]
    UnknownEntry { uuid: Uuid, index: usize },

    #[error(transparent)]
    Request(#[from] RequestError),
}

impl ChatError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ChatError::Request(err) if err.is_unauthorized())
    }
}

/// How an exchange ended. The assistant entry already reflects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Completed { text: String },
    Canceled { partial: String },
    Failed { message: String },
}

pub struct ChatService {
    client: HttpClient,
    settings: Option<Settings>,
    long_reply: bool,
}

impl ChatService {
    pub fn new(client: HttpClient, config: &Config) -> Self {
        Self {
            client,
            settings: config.request_settings().cloned(),
            long_reply: config.long_reply_enabled(),
        }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Ask `prompt` in conversation `uuid`, continuing from its last reply.
    ///
    /// `on_update` receives the full reply text after every streamed line.
    /// Only unauthorized failures (and unknown conversations) are returned
    /// as errors; other failures are written into the reply entry.
    pub async fn send<F>(
        &self,
        store: &mut ChatStore,
        uuid: Uuid,
        prompt: &str,
        cancel: Option<CancellationToken>,
        mut on_update: F,
    ) -> Result<ExchangeOutcome, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        if store.conversation(uuid).is_none() {
            return Err(ChatError::UnknownConversation(uuid));
        }

        let options = store.last_context(uuid).unwrap_or_default();
        store.add_entry(uuid, ChatEntry::user(prompt, options.clone()));
        let index = store
            .add_entry(uuid, ChatEntry::assistant_placeholder(prompt, options.clone()))
            .ok_or(ChatError::UnknownConversation(uuid))?;

        self.exchange(store, uuid, index, prompt.to_string(), options, cancel, &mut on_update)
            .await
    }

    /// Re-send the request behind the assistant reply at `index`, replacing it.
    pub async fn regenerate<F>(
        &self,
        store: &mut ChatStore,
        uuid: Uuid,
        index: usize,
        cancel: Option<CancellationToken>,
        mut on_update: F,
    ) -> Result<ExchangeOutcome, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        if store.conversation(uuid).is_none() {
            return Err(ChatError::UnknownConversation(uuid));
        }
        let snapshot = store
            .entry(uuid, index)
            .filter(|entry| entry.is_assistant())
            .and_then(|entry| entry.request_options.clone())
            .ok_or(ChatError::UnknownEntry { uuid, index })?;

        store.update_entry_some(
            uuid,
            index,
            ChatEntryPatch::default()
                .text("")
                .error(false)
                .loading(true)
                .conversation_options(None),
        );

        self.exchange(
            store,
            uuid,
            index,
            snapshot.prompt,
            snapshot.options,
            cancel,
            &mut on_update,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn exchange<F>(
        &self,
        store: &mut ChatStore,
        uuid: Uuid,
        index: usize,
        mut prompt: String,
        mut options: ConversationOptions,
        cancel: Option<CancellationToken>,
        on_update: &mut F,
    ) -> Result<ExchangeOutcome, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        // Text of earlier rounds when a truncated reply is being continued.
        let mut prefix = String::new();

        loop {
            let mut latest: Option<ChatLine> = None;
            let result = {
                let prefix = prefix.as_str();
                let latest = &mut latest;
                let store = &mut *store;
                let on_update = &mut *on_update;
                let on_progress = move |event: &ProgressEvent<'_>| {
                    let Some(line) = last_chat_line(event.text) else {
                        return;
                    };
                    let text = format!("{prefix}{}", line.text);
                    store.update_entry_some(
                        uuid,
                        index,
                        ChatEntryPatch::default()
                            .text(text.as_str())
                            .conversation_options(Some(line.next_options())),
                    );
                    on_update(&text);
                    *latest = Some(line);
                };

                fetch_chat_process(
                    &self.client,
                    ChatProcessParams {
                        prompt: prompt.clone(),
                        options: options.clone(),
                        settings: self.settings.as_ref(),
                        cancel: cancel.clone(),
                        on_progress: Some(Box::new(on_progress)),
                    },
                )
                .await
            };

            match result {
                Ok(_) => match latest {
                    Some(line) if self.long_reply && line.is_truncated() => {
                        info!(conversation = %uuid, "Reply truncated; requesting continuation");
                        prefix.push_str(&line.text);
                        prompt.clear();
                        options = line.next_options();
                    }
                    _ => {
                        store.update_entry_some(uuid, index, ChatEntryPatch::default().loading(false));
                        let text = current_text(store, uuid, index);
                        debug!(conversation = %uuid, chars = text.len(), "Reply completed");
                        return Ok(ExchangeOutcome::Completed { text });
                    }
                },
                Err(err) => return settle_failure(store, uuid, index, err),
            }
        }
    }
}

fn settle_failure(
    store: &mut ChatStore,
    uuid: Uuid,
    index: usize,
    err: RequestError,
) -> Result<ExchangeOutcome, ChatError> {
    let partial = current_text(store, uuid, index);

    if err.is_canceled() {
        debug!(conversation = %uuid, "Reply canceled");
        store.update_entry_some(uuid, index, ChatEntryPatch::default().loading(false));
        return Ok(ExchangeOutcome::Canceled { partial });
    }

    let message = err.to_string();
    warn!(conversation = %uuid, error = %message, "Reply failed");
    let patch = if partial.is_empty() {
        ChatEntryPatch::default().text(message.as_str()).error(true)
    } else {
        ChatEntryPatch::default()
            .text(format!("{partial}\n[{message}]"))
            .error(false)
    };
    store.update_entry_some(uuid, index, patch.loading(false));

    if err.is_unauthorized() {
        return Err(ChatError::Request(err));
    }
    Ok(ExchangeOutcome::Failed { message })
}

fn current_text(store: &ChatStore, uuid: Uuid, index: usize) -> String {
    store
        .entry(uuid, index)
        .map(|entry| entry.text.clone())
        .unwrap_or_default()
}

/// Parse the newest complete line of a cumulative NDJSON snapshot.
///
/// A trailing newline does not start a new line, so the search for the line
/// start skips the final byte. Lines that do not parse yet are ignored.
pub fn last_chat_line(text: &str) -> Option<ChatLine> {
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let start = memrchr(b'\n', &bytes[..bytes.len() - 1]).map_or(0, |pos| pos + 1);
    let line = text[start..].trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}
