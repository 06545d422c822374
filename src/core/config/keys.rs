//! `chatweb set` / `chatweb unset` key handling.

use thiserror::Error;

use crate::auth::TokenStorage;
use crate::core::config::data::{ApiMode, Config};

pub const CONFIG_KEYS: &[&str] = &[
    "base-url",
    "api-mode",
    "token-storage",
    "timeout",
    "long-reply",
    "system-message",
    "temperature",
    "top-p",
];

#[derive(Debug, Error, PartialEq)]
pub enum ConfigKeyError {
    #[error("Unknown config key: {0} (known keys: {keys})", keys = CONFIG_KEYS.join(", "))]
    UnknownKey(String),
    #[error("Invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

fn invalid(key: &str, value: &str, expected: &'static str) -> ConfigKeyError {
    ConfigKeyError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn parse_unit_range(key: &str, value: &str, max: f32) -> Result<f32, ConfigKeyError> {
    let expected = if max > 1.0 {
        "a number between 0 and 2"
    } else {
        "a number between 0 and 1"
    };
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|parsed| (0.0..=max).contains(parsed))
        .ok_or_else(|| invalid(key, value, expected))
}

impl Config {
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<(), ConfigKeyError> {
        match key {
            "base-url" => {
                let trimmed = value.trim();
                if !trimmed.starts_with("http") {
                    return Err(invalid(key, value, "an http(s) URL"));
                }
                self.base_url = Some(trimmed.to_string());
            }
            "api-mode" => {
                self.api_mode =
                    ApiMode::parse(value).ok_or_else(|| invalid(key, value, "official or unofficial"))?;
            }
            "token-storage" => {
                self.token_storage = TokenStorage::parse(value)
                    .ok_or_else(|| invalid(key, value, "memory or keyring"))?;
            }
            "timeout" => {
                let secs = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| invalid(key, value, "a whole number of seconds"))?;
                self.timeout_secs = Some(secs);
            }
            "long-reply" => {
                self.long_reply =
                    Some(parse_bool(value).ok_or_else(|| invalid(key, value, "on or off"))?);
            }
            "system-message" => {
                self.settings.system_message = value.to_string();
            }
            "temperature" => {
                self.settings.temperature = parse_unit_range(key, value, 2.0)?;
            }
            "top-p" => {
                self.settings.top_p = parse_unit_range(key, value, 1.0)?;
            }
            _ => return Err(ConfigKeyError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn unset_key(&mut self, key: &str) -> Result<(), ConfigKeyError> {
        let defaults = Config::default();
        match key {
            "base-url" => self.base_url = None,
            "api-mode" => self.api_mode = defaults.api_mode,
            "token-storage" => self.token_storage = defaults.token_storage,
            "timeout" => self.timeout_secs = None,
            "long-reply" => self.long_reply = None,
            "system-message" => self.settings.system_message = defaults.settings.system_message,
            "temperature" => self.settings.temperature = defaults.settings.temperature,
            "top-p" => self.settings.top_p = defaults.settings.top_p,
            _ => return Err(ConfigKeyError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.base_url {
            Some(url) => println!("  base-url: {url}"),
            None => println!("  base-url: (unset)"),
        }
        println!("  api-mode: {}", self.api_mode.as_str());
        println!("  token-storage: {}", self.token_storage.as_str());
        match self.timeout_secs {
            Some(secs) => println!("  timeout: {secs}s"),
            None => println!("  timeout: (unset)"),
        }
        println!(
            "  long-reply: {}",
            if self.long_reply_enabled() { "on" } else { "off" }
        );
        println!("  system-message: {}", self.settings.system_message);
        println!("  temperature: {}", self.settings.temperature);
        println!("  top-p: {}", self.settings.top_p);
    }
}
