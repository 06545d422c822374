use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::TokenStorage;
use crate::utils::url::normalize_base_url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3002/api";
pub const BASE_URL_ENV: &str = "CHATWEB_API_BASE_URL";
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are ChatGPT, a large language model trained by OpenAI. Follow the user's instructions carefully. Respond using markdown.";
pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_TOP_P: f32 = 1.0;

/// Which upstream the proxy talks to.
///
/// Only the official API accepts sampling parameters and a system message,
/// so [`Settings`] are attached to chat requests in that mode only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    #[default]
    Official,
    Unofficial,
}

impl ApiMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiMode::Official => "official",
            ApiMode::Unofficial => "unofficial",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "official" => Some(ApiMode::Official),
            "unofficial" => Some(ApiMode::Unofficial),
            _ => None,
        }
    }
}

/// Request shaping parameters for the official API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub system_message: String,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }
}

impl Settings {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// API base URL that relative endpoint paths are joined onto
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_mode: ApiMode,
    /// Where the bearer token lives between requests
    #[serde(default)]
    pub token_storage: TokenStorage,
    /// Whole-request timeout in seconds; unset means no client-side limit
    pub timeout_secs: Option<u64>,
    /// Keep requesting when a reply stops because of the length limit
    pub long_reply: Option<bool>,
    #[serde(default)]
    pub settings: Settings,
}

impl Config {
    /// Pick the base URL: explicit override, then environment, then the
    /// config file, then the built-in default.
    pub fn resolve_base_url(&self, override_url: Option<&str>, env_url: Option<&str>) -> String {
        let chosen = [override_url, env_url, self.base_url.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL);
        normalize_base_url(chosen)
    }

    /// [`Config::resolve_base_url`] with the environment read from
    /// `CHATWEB_API_BASE_URL`.
    pub fn effective_base_url(&self, override_url: Option<&str>) -> String {
        let env_url = std::env::var(BASE_URL_ENV).ok();
        self.resolve_base_url(override_url, env_url.as_deref())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn long_reply_enabled(&self) -> bool {
        self.long_reply.unwrap_or(false)
    }

    /// Settings to send with chat requests, if the API mode accepts them.
    pub fn request_settings(&self) -> Option<&Settings> {
        match self.api_mode {
            ApiMode::Official => Some(&self.settings),
            ApiMode::Unofficial => None,
        }
    }
}

/// Get a user-friendly display string for a path, abbreviating the home
/// directory to `~` on Unix-like systems.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
