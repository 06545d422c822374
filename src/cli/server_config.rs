//! `chatweb config`: backend configuration and usage

use std::error::Error;

use serde_json::Value;

use crate::api::endpoints::fetch_chat_config;
use crate::api::ConfigData;
use crate::cli::auth::display_or_unknown;
use crate::http::HttpClient;

pub async fn run_server_config(client: &HttpClient) -> Result<(), Box<dyn Error>> {
    let envelope = fetch_chat_config(client).await?;
    let data = envelope.data.unwrap_or_default();
    for line in config_lines(client.base_url(), &data) {
        println!("{line}");
    }
    Ok(())
}

fn or_dash(value: &Option<String>) -> &str {
    value
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or("-")
}

pub(crate) fn config_lines(base_url: &str, data: &ConfigData) -> Vec<String> {
    let mut lines = vec![
        format!("Backend: {base_url}"),
        format!(
            "API model: {}",
            display_or_unknown(data.api_model.as_deref().unwrap_or_default())
        ),
        format!("Reverse proxy: {}", or_dash(&data.reverse_proxy)),
        format!(
            "Timeout: {}",
            data.timeout_ms
                .map(|ms| format!("{ms} ms"))
                .unwrap_or_else(|| "-".to_string())
        ),
        format!("SOCKS proxy: {}", or_dash(&data.socks_proxy)),
        format!("HTTPS proxy: {}", or_dash(&data.https_proxy)),
    ];
    let usage = match &data.usage {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(text)) if text.trim().is_empty() => "-".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    };
    lines.push(format!("Usage: {usage}"));
    lines
}
