//! Streaming HTTP client for the chat proxy.
//!
//! [`HttpClient::request`] sends one request, streams the body while
//! reporting the cumulative decoded text through an optional progress
//! callback, and then inspects the terminal JSON record of the body. A
//! `200 OK` whose last record says `"status": "Unauthorized"` or `"Fail"`
//! still fails the call; unauthorized answers and non-2xx statuses also clear
//! the held token.

pub mod decode;
pub mod error;
pub mod terminal;

#[cfg(test)]
pub(crate) mod tests;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::auth::TokenStore;
use crate::utils::url::resolve_url;

use self::decode::{accumulate_body, emit};
pub use self::error::RequestError;
use self::terminal::parse_terminal_record;
pub use self::terminal::{RecordOrigin, ResponseStatus, TerminalRecord};

/// Lifecycle hook run once before the request starts or once after it ends.
pub type Hook<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Receives a snapshot of the body decoded so far after each chunk.
pub type ProgressCallback<'a> = Box<dyn FnMut(&ProgressEvent<'_>) + Send + 'a>;

/// Snapshot delivered to a [`ProgressCallback`].
///
/// `text` is everything decoded so far, not the latest chunk, so a consumer
/// can replace its display buffer on each event.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent<'a> {
    pub text: &'a str,
    /// Raw bytes received so far.
    pub loaded: u64,
    /// `Content-Length` when the server announced one.
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// Request payload, either ready or produced when the request is built.
pub enum RequestBody<'a> {
    Value(Value),
    Producer(Box<dyn FnOnce() -> Value + Send + 'a>),
}

impl RequestBody<'_> {
    fn into_value(self) -> Value {
        match self {
            RequestBody::Value(value) => value,
            RequestBody::Producer(produce) => produce(),
        }
    }
}

/// Everything that describes one call through [`HttpClient`].
#[derive(Default)]
pub struct RequestOptions<'a> {
    pub url: String,
    pub method: Method,
    pub body: Option<RequestBody<'a>>,
    pub headers: Option<HeaderMap>,
    pub cancel: Option<CancellationToken>,
    pub timeout: Option<Duration>,
    pub before_request: Option<Hook<'a>>,
    pub after_request: Option<Hook<'a>>,
    pub on_progress: Option<ProgressCallback<'a>>,
}

impl<'a> RequestOptions<'a> {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.body = Some(RequestBody::Value(payload));
        self
    }

    pub fn payload_with(mut self, produce: impl FnOnce() -> Value + Send + 'a) -> Self {
        self.body = Some(RequestBody::Producer(Box::new(produce)));
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn before_request(mut self, hook: impl FnOnce() + Send + 'a) -> Self {
        self.before_request = Some(Box::new(hook));
        self
    }

    pub fn after_request(mut self, hook: impl FnOnce() + Send + 'a) -> Self {
        self.after_request = Some(Box::new(hook));
        self
    }

    pub fn on_progress(mut self, callback: impl FnMut(&ProgressEvent<'_>) + Send + 'a) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }
}

/// A completed, validated response.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    text: String,
    record: Option<TerminalRecord>,
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn record(&self) -> Option<&TerminalRecord> {
        self.record.as_ref()
    }

    /// Deserialize the terminal record.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        let value = self
            .record
            .as_ref()
            .map(|record| record.value.clone())
            .unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(RequestError::Decode)
    }
}

/// HTTP client bound to one API base URL and one token holder.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    timeout: Option<Duration>,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenStore>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, tokens)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            tokens,
            timeout: None,
        }
    }

    /// Default whole-request timeout applied when a request sets none.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub fn resolve_url(&self, url: &str) -> String {
        resolve_url(&self.base_url, url)
    }

    pub async fn get(&self, options: RequestOptions<'_>) -> Result<Response, RequestError> {
        self.request(options.method(Method::Get)).await
    }

    pub async fn post(&self, options: RequestOptions<'_>) -> Result<Response, RequestError> {
        self.request(options.method(Method::Post)).await
    }

    /// Send a request and wait for the validated result.
    ///
    /// `before_request` runs first and `after_request` runs last on every
    /// path, including failure and cancellation.
    pub async fn request(&self, mut options: RequestOptions<'_>) -> Result<Response, RequestError> {
        let before = options.before_request.take();
        let after = options.after_request.take();
        let cancel = options.cancel.take();
        let url = options.url.clone();

        if let Some(hook) = before {
            hook();
        }

        let result = match cancel {
            Some(cancel) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(url = %url, "Request canceled");
                        Err(RequestError::Canceled)
                    }
                    result = self.execute(&mut options) => result,
                }
            }
            None => self.execute(&mut options).await,
        };

        if let Some(hook) = after {
            hook();
        }

        result
    }

    async fn execute(&self, options: &mut RequestOptions<'_>) -> Result<Response, RequestError> {
        let target = self.resolve_url(&options.url);
        let mut url = Url::parse(&target).map_err(|err| RequestError::InvalidUrl {
            url: target.clone(),
            reason: err.to_string(),
        })?;

        let method = options.method;
        let payload = options.body.take().map(RequestBody::into_value);
        let mut headers = options.headers.take().unwrap_or_default();

        let body = if method == Method::Get {
            if let Some(payload) = &payload {
                append_query(&mut url, payload);
            }
            None
        } else {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            payload
                .map(|payload| serde_json::to_vec(&payload).map_err(RequestError::Encode))
                .transpose()?
        };

        let token = self.tokens.get_token();
        if let Some(token) = &token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| RequestError::InvalidToken)?;
            headers.insert(AUTHORIZATION, value);
        }

        debug!(
            method = method.as_str(),
            url = %url,
            has_token = token.is_some(),
            "Sending request"
        );

        let mut request = self.client.request(method.as_reqwest(), url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        if let Some(timeout) = options.timeout.or(self.timeout) {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(RequestError::network)?;
        let status = response.status();
        let total = response.content_length();

        let text = if has_body_stream(status, total) {
            accumulate_body(response.bytes_stream(), total, &mut options.on_progress)
                .await
                .map_err(RequestError::network)?
        } else {
            let text = response.text().await.map_err(RequestError::network)?;
            emit(&mut options.on_progress, &text, text.len() as u64, total);
            text
        };

        self.finish(status, text)
    }

    fn finish(&self, status: StatusCode, text: String) -> Result<Response, RequestError> {
        let record = parse_terminal_record(&text);
        if let Some(record) = &record {
            debug!(origin = record.origin.as_str(), "Parsed terminal record");
        }

        let record_status = record.as_ref().and_then(TerminalRecord::status);
        let message = record.as_ref().and_then(TerminalRecord::message);
        let unauthorized =
            status == StatusCode::UNAUTHORIZED || record_status == Some(ResponseStatus::Unauthorized);

        if !status.is_success() || unauthorized {
            warn!(status = status.as_u16(), unauthorized, "Clearing held token");
            self.tokens.remove_token();

            if unauthorized {
                let fallback = if status.is_success() {
                    "access token rejected".to_string()
                } else {
                    status_text(status)
                };
                return Err(RequestError::Unauthorized {
                    message: message.unwrap_or(fallback),
                });
            }
            return Err(RequestError::Transport {
                status: Some(status),
                message: message.unwrap_or_else(|| status_text(status)),
                source: None,
            });
        }

        if let Some(tag) = record_status {
            if !tag.is_success() {
                return Err(RequestError::Application {
                    message: message.unwrap_or_else(|| tag.to_string()),
                    status: tag,
                });
            }
        }

        Ok(Response {
            status,
            text,
            record,
        })
    }
}

/// Flatten a GET payload into query parameters.
///
/// Strings are used verbatim, other values are JSON-encoded and nulls are
/// dropped. Non-object payloads add nothing.
pub fn append_query(url: &mut Url, payload: &Value) {
    let Value::Object(entries) = payload else {
        return;
    };

    let pairs: Vec<(&str, String)> = entries
        .iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key.as_str(), text.clone())),
            other => Some((key.as_str(), other.to_string())),
        })
        .collect();

    if pairs.is_empty() {
        return;
    }

    let mut query = url.query_pairs_mut();
    for (key, value) in pairs {
        query.append_pair(key, &value);
    }
}

// No-content statuses and an announced empty body have nothing to stream.
fn has_body_stream(status: StatusCode, content_length: Option<u64>) -> bool {
    !(status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
        || content_length == Some(0))
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_str().to_string())
}
