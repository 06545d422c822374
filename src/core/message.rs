use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ConversationOptions;

pub const NEW_CHAT_TITLE: &str = "New Chat";

/// The request that produced an assistant entry, kept for regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    pub prompt: String,
    #[serde(default)]
    pub options: ConversationOptions,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub date_time: DateTime<Utc>,
    pub text: String,
    /// True for the user's own messages.
    #[serde(default)]
    pub inversion: bool,
    #[serde(default)]
    pub error: bool,
    /// Still receiving text.
    #[serde(default)]
    pub loading: bool,
    #[serde(default)]
    pub conversation_options: Option<ConversationOptions>,
    #[serde(default)]
    pub request_options: Option<RequestSnapshot>,
}

impl ChatEntry {
    pub fn user(prompt: impl Into<String>, options: ConversationOptions) -> Self {
        let prompt = prompt.into();
        Self {
            date_time: Utc::now(),
            text: prompt.clone(),
            inversion: true,
            error: false,
            loading: false,
            conversation_options: None,
            request_options: Some(RequestSnapshot { prompt, options }),
        }
    }

    /// Empty assistant entry that streamed text will be written into.
    pub fn assistant_placeholder(prompt: impl Into<String>, options: ConversationOptions) -> Self {
        Self {
            date_time: Utc::now(),
            text: String::new(),
            inversion: false,
            error: false,
            loading: true,
            conversation_options: None,
            request_options: Some(RequestSnapshot {
                prompt: prompt.into(),
                options,
            }),
        }
    }

    pub fn is_user(&self) -> bool {
        self.inversion
    }

    pub fn is_assistant(&self) -> bool {
        !self.inversion
    }

    pub fn apply(&mut self, patch: ChatEntryPatch) {
        if let Some(text) = patch.text {
            self.text = text;
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
        if let Some(loading) = patch.loading {
            self.loading = loading;
        }
        if let Some(options) = patch.conversation_options {
            self.conversation_options = options;
        }
    }
}

/// Partial update for [`ChatEntry`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatEntryPatch {
    pub text: Option<String>,
    pub error: Option<bool>,
    pub loading: Option<bool>,
    pub conversation_options: Option<Option<ConversationOptions>>,
}

impl ChatEntryPatch {
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn error(mut self, error: bool) -> Self {
        self.error = Some(error);
        self
    }

    pub fn loading(mut self, loading: bool) -> Self {
        self.loading = Some(loading);
        self
    }

    pub fn conversation_options(mut self, options: Option<ConversationOptions>) -> Self {
        self.conversation_options = Some(options);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub uuid: Uuid,
    pub title: String,
    #[serde(default)]
    pub is_edit: bool,
    #[serde(default)]
    pub entries: Vec<ChatEntry>,
}

impl Conversation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            is_edit: false,
            entries: Vec::new(),
        }
    }
}
