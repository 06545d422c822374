//! Token login/logout and session inspection

use std::error::Error;

use crate::api::endpoints::{fetch_session, fetch_verify};
use crate::auth::TokenStorage;
use crate::http::HttpClient;

pub async fn run_login(
    client: &HttpClient,
    token: &str,
    storage: TokenStorage,
    explicit_token: bool,
) -> Result<(), Box<dyn Error>> {
    let token = token.trim();
    if token.is_empty() {
        eprintln!("Usage: chatweb login <token>");
        std::process::exit(1);
    }

    let envelope = fetch_verify(client, token).await?;
    client.tokens().set_token(token);

    if envelope.message.is_empty() {
        println!("✅ Token verified");
    } else {
        println!("✅ {}", envelope.message);
    }

    if explicit_token {
        println!("Note: --token/CHATWEB_TOKEN is set, so the verified token was not persisted.");
    } else if !storage.is_persistent() {
        println!(
            "Note: token storage is '{}', so the token only lasts for this process.",
            storage.as_str()
        );
        println!("Run 'chatweb set token-storage keyring' to keep it between runs.");
    }
    Ok(())
}

pub fn run_logout(client: &HttpClient, storage: TokenStorage) -> Result<(), Box<dyn Error>> {
    let had_token = client.tokens().get_token().is_some();
    client.tokens().remove_token();
    if had_token {
        println!("✅ Removed the stored token ({})", storage.as_str());
    } else {
        println!("No token was stored ({})", storage.as_str());
    }
    Ok(())
}

pub async fn run_session(client: &HttpClient) -> Result<(), Box<dyn Error>> {
    let envelope = fetch_session(client).await?;
    let session = envelope.data.unwrap_or_default();

    println!("Backend: {}", client.base_url());
    println!("Model: {}", display_or_unknown(&session.model));
    println!(
        "Token required: {}",
        if session.auth { "yes" } else { "no" }
    );
    println!(
        "Token held: {}",
        if client.tokens().get_token().is_some() {
            "yes"
        } else {
            "no"
        }
    );
    Ok(())
}

pub(crate) fn display_or_unknown(value: &str) -> &str {
    if value.trim().is_empty() {
        "(unknown)"
    } else {
        value
    }
}
