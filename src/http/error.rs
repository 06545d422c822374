use reqwest::StatusCode;
use thiserror::Error;

use super::terminal::ResponseStatus;

/// Every way a request through [`super::HttpClient`] can fail.
///
/// Callers usually only need to branch on [`RequestError::is_canceled`]
/// (drop the partial result quietly) and [`RequestError::is_unauthorized`]
/// (send the user back to login); everything else is shown as-is.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The caller's cancellation token fired before the body completed.
    #[error("Request canceled")]
    Canceled,

    /// HTTP 401, or an `Unauthorized` status tag in the terminal record.
    /// The held token has already been cleared.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Network failure or a non-2xx HTTP status.
    #[error("{message}")]
    Transport {
        status: Option<StatusCode>,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The transport succeeded but the terminal record reports failure.
    #[error("{message}")]
    Application {
        status: ResponseStatus,
        message: String,
    },

    #[error("Invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Held token cannot be sent as an Authorization header")]
    InvalidToken,

    #[error("Failed to encode request payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode response payload: {0}")]
    Decode(#[source] serde_json::Error),
}

impl RequestError {
    pub(crate) fn network(err: reqwest::Error) -> Self {
        RequestError::Transport {
            status: err.status(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, RequestError::Canceled)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RequestError::Unauthorized { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RequestError::Transport { source: Some(source), .. } if source.is_timeout()
        )
    }

    /// HTTP status of the failed response, when there was one.
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            RequestError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}
