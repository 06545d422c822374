//! Conversation history.
//!
//! The store keeps every conversation in memory, newest first, plus the id of
//! the active one. It is persisted as a single JSON snapshot; there is no
//! incremental storage.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use uuid::Uuid;

use crate::api::ConversationOptions;
use crate::core::config::data::path_display;
use crate::core::config::io::project_dirs;
use crate::core::message::{ChatEntry, ChatEntryPatch, Conversation, NEW_CHAT_TITLE};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read chat history at {}: {source}", path_display(.path))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Chat history at {} is corrupt: {source}", path_display(.path))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to write chat history at {}: {source}", path_display(.path))]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize chat history: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Could not determine a data directory for this platform")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStore {
    active: Option<Uuid>,
    history: Vec<Conversation>,
}

impl Default for ChatStore {
    fn default() -> Self {
        let conversation = Conversation::new(NEW_CHAT_TITLE);
        Self {
            active: Some(conversation.uuid),
            history: vec![conversation],
        }
    }
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.history
    }

    pub fn conversation(&self, uuid: Uuid) -> Option<&Conversation> {
        self.history.iter().find(|c| c.uuid == uuid)
    }

    fn conversation_mut(&mut self, uuid: Uuid) -> Option<&mut Conversation> {
        self.history.iter_mut().find(|c| c.uuid == uuid)
    }

    pub fn active_uuid(&self) -> Option<Uuid> {
        self.active
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.and_then(|uuid| self.conversation(uuid))
    }

    /// Returns false when no conversation has that id.
    pub fn set_active(&mut self, uuid: Uuid) -> bool {
        if self.conversation(uuid).is_none() {
            return false;
        }
        self.active = Some(uuid);
        true
    }

    /// Start a new conversation at the top of the list and activate it.
    pub fn add_conversation(&mut self, title: impl Into<String>) -> Uuid {
        let conversation = Conversation::new(title);
        let uuid = conversation.uuid;
        self.history.insert(0, conversation);
        self.active = Some(uuid);
        uuid
    }

    /// Active conversation, creating one when the store is empty.
    pub fn ensure_active(&mut self) -> Uuid {
        match self.active.filter(|uuid| self.conversation(*uuid).is_some()) {
            Some(uuid) => uuid,
            None => match self.history.first() {
                Some(first) => {
                    let uuid = first.uuid;
                    self.active = Some(uuid);
                    uuid
                }
                None => self.add_conversation(NEW_CHAT_TITLE),
            },
        }
    }

    pub fn rename_conversation(&mut self, uuid: Uuid, title: impl Into<String>) -> bool {
        match self.conversation_mut(uuid) {
            Some(conversation) => {
                conversation.title = title.into();
                conversation.is_edit = false;
                true
            }
            None => false,
        }
    }

    /// Remove a conversation. When it was active, the newer conversation
    /// listed just above it (or the first remaining one) becomes active.
    pub fn delete_conversation(&mut self, uuid: Uuid) -> bool {
        let Some(index) = self.history.iter().position(|c| c.uuid == uuid) else {
            return false;
        };
        self.history.remove(index);

        if self.active == Some(uuid) {
            self.active = if self.history.is_empty() {
                None
            } else if index > 0 && index <= self.history.len() {
                Some(self.history[index - 1].uuid)
            } else {
                Some(self.history[0].uuid)
            };
        }
        true
    }

    pub fn entries(&self, uuid: Uuid) -> &[ChatEntry] {
        self.conversation(uuid)
            .map(|c| c.entries.as_slice())
            .unwrap_or_default()
    }

    pub fn entry(&self, uuid: Uuid, index: usize) -> Option<&ChatEntry> {
        self.entries(uuid).get(index)
    }

    /// Append an entry and return its index. The first line of the first
    /// entry of an untitled conversation becomes its title.
    pub fn add_entry(&mut self, uuid: Uuid, entry: ChatEntry) -> Option<usize> {
        let conversation = self.conversation_mut(uuid)?;
        if conversation.title == NEW_CHAT_TITLE && conversation.entries.is_empty() {
            if let Some(title) = title_from(&entry.text) {
                conversation.title = title.to_string();
            }
        }
        conversation.entries.push(entry);
        Some(conversation.entries.len() - 1)
    }

    pub fn update_entry(&mut self, uuid: Uuid, index: usize, entry: ChatEntry) -> bool {
        match self.entry_mut(uuid, index) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }

    pub fn update_entry_some(&mut self, uuid: Uuid, index: usize, patch: ChatEntryPatch) -> bool {
        match self.entry_mut(uuid, index) {
            Some(entry) => {
                entry.apply(patch);
                true
            }
            None => false,
        }
    }

    fn entry_mut(&mut self, uuid: Uuid, index: usize) -> Option<&mut ChatEntry> {
        self.conversation_mut(uuid)?.entries.get_mut(index)
    }

    pub fn delete_entry(&mut self, uuid: Uuid, index: usize) -> bool {
        match self.conversation_mut(uuid) {
            Some(conversation) if index < conversation.entries.len() => {
                conversation.entries.remove(index);
                true
            }
            _ => false,
        }
    }

    pub fn clear_conversation(&mut self, uuid: Uuid) -> bool {
        match self.conversation_mut(uuid) {
            Some(conversation) => {
                conversation.entries.clear();
                true
            }
            None => false,
        }
    }

    /// Drop everything and start over with a single empty conversation.
    pub fn clear_all(&mut self) {
        *self = Self::default();
    }

    /// Thread position after the latest assistant reply that has one.
    pub fn last_context(&self, uuid: Uuid) -> Option<ConversationOptions> {
        self.entries(uuid)
            .iter()
            .rev()
            .filter(|entry| entry.is_assistant())
            .find_map(|entry| entry.conversation_options.clone())
    }

    pub fn load() -> Result<Self, StoreError> {
        Self::load_from_path(&Self::history_path()?)
    }

    pub fn save(&self) -> Result<(), StoreError> {
        self.save_to_path(&Self::history_path()?)
    }

    /// Load a snapshot; a missing file yields a fresh store.
    pub fn load_from_path(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut store: ChatStore =
            serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        // Replies interrupted by a crash are finished, not resumed.
        for conversation in &mut store.history {
            for entry in &mut conversation.entries {
                entry.loading = false;
            }
        }
        Ok(store)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), StoreError> {
        let contents = serde_json::to_vec_pretty(self).map_err(StoreError::Serialize)?;
        let write_err = |source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_err)?;
        temp_file.write_all(&contents).map_err(write_err)?;
        temp_file.as_file_mut().sync_all().map_err(write_err)?;
        temp_file.persist(path).map_err(|err| write_err(err.error))?;
        Ok(())
    }

    pub fn history_path() -> Result<PathBuf, StoreError> {
        project_dirs()
            .map(|dirs| dirs.data_dir().join("history.json"))
            .ok_or(StoreError::NoDataDir)
    }
}

fn title_from(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}
