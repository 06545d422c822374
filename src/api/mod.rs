//! Payloads exchanged with the chat proxy.

pub mod endpoints;

use serde::{Deserialize, Serialize};

use crate::core::config::Settings;
use crate::http::ResponseStatus;

/// `{ data, message, status }` wrapper used by every non-streaming endpoint
/// and by the trailing status line of a failed chat stream.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
    pub status: ResponseStatus,
}

/// Thread position that lets the backend continue a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatProcessRequest {
    pub prompt: String,
    pub options: ConversationOptions,
    #[serde(rename = "systemMessage", skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl ChatProcessRequest {
    pub fn new(
        prompt: impl Into<String>,
        options: ConversationOptions,
        settings: Option<&Settings>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            options,
            system_message: settings.map(|s| s.system_message.clone()),
            temperature: settings.map(|s| s.temperature),
            top_p: settings.map(|s| s.top_p),
        }
    }
}

/// One line of the `/chat-process` stream: the reply so far.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLine {
    pub id: String,
    #[serde(default)]
    pub parent_message_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Cumulative reply text, not a delta.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub detail: Option<ChatLineDetail>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ChatLineDetail {
    #[serde(default)]
    pub choices: Vec<ChatLineChoice>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ChatLineChoice {
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl ChatLine {
    /// Options that continue the thread after this message.
    pub fn next_options(&self) -> ConversationOptions {
        ConversationOptions {
            conversation_id: self.conversation_id.clone(),
            parent_message_id: Some(self.id.clone()),
        }
    }

    /// True when the upstream stopped because the reply hit its length limit.
    pub fn is_truncated(&self) -> bool {
        self.detail
            .as_ref()
            .and_then(|detail| detail.choices.first())
            .and_then(|choice| choice.finish_reason.as_deref())
            == Some("length")
    }
}

/// Server information shown by `chatweb config`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigData {
    pub api_model: Option<String>,
    pub reverse_proxy: Option<String>,
    pub timeout_ms: Option<u64>,
    pub socks_proxy: Option<String>,
    pub https_proxy: Option<String>,
    /// Account usage as reported by the backend; shape varies by upstream.
    pub usage: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionData {
    /// Whether the backend requires a token.
    pub auth: bool,
    pub model: String,
}
