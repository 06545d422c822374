use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::api::{ChatProcessRequest, ConfigData, ConversationOptions, Envelope, SessionData};
use crate::core::config::Settings;
use crate::http::{HttpClient, ProgressCallback, RequestError, RequestOptions, Response};

pub const CHAT_PROCESS_PATH: &str = "/chat-process";
pub const CONFIG_PATH: &str = "/config";
pub const SESSION_PATH: &str = "/session";
pub const VERIFY_PATH: &str = "/verify";

pub async fn fetch_chat_config(client: &HttpClient) -> Result<Envelope<ConfigData>, RequestError> {
    client.post(RequestOptions::new(CONFIG_PATH)).await?.json()
}

pub async fn fetch_session(client: &HttpClient) -> Result<Envelope<SessionData>, RequestError> {
    client.post(RequestOptions::new(SESSION_PATH)).await?.json()
}

/// Ask the backend whether `token` is accepted. Storing it is up to the
/// caller.
pub async fn fetch_verify(client: &HttpClient, token: &str) -> Result<Envelope<Value>, RequestError> {
    client
        .post(RequestOptions::new(VERIFY_PATH).payload(json!({ "token": token })))
        .await?
        .json()
}

/// Inputs for one `/chat-process` call.
pub struct ChatProcessParams<'a> {
    pub prompt: String,
    pub options: ConversationOptions,
    /// Sent only in official API mode.
    pub settings: Option<&'a Settings>,
    pub cancel: Option<CancellationToken>,
    pub on_progress: Option<ProgressCallback<'a>>,
}

pub async fn fetch_chat_process(
    client: &HttpClient,
    params: ChatProcessParams<'_>,
) -> Result<Response, RequestError> {
    let ChatProcessParams {
        prompt,
        options,
        settings,
        cancel,
        on_progress,
    } = params;

    let body = ChatProcessRequest::new(prompt, options, settings);
    let payload = serde_json::to_value(&body).map_err(RequestError::Encode)?;

    let mut request = RequestOptions::new(CHAT_PROCESS_PATH).payload(payload);
    request.cancel = cancel;
    request.on_progress = on_progress;
    client.post(request).await
}
