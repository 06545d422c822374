//! Bearer-token holders.
//!
//! [`crate::http::HttpClient`] takes an `Arc<dyn TokenStore>` at
//! construction, reads it on every request and clears it when the backend
//! rejects the credential. Which implementation backs it is a configuration
//! choice ([`TokenStorage`]): the in-memory store forgets the token when the
//! process exits, the keyring store keeps it in the platform credential
//! store.

pub mod keyring;

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

pub use self::keyring::KeyringTokenStore;

/// Opaque storage for a single bearer token.
pub trait TokenStore: Send + Sync {
    fn get_token(&self) -> Option<String>;
    fn set_token(&self, token: &str);
    fn remove_token(&self);
}

/// Token holder that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_token(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    fn remove_token(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Where the token is kept between requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    #[default]
    Memory,
    Keyring,
}

impl TokenStorage {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenStorage::Memory => "memory",
            TokenStorage::Keyring => "keyring",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(TokenStorage::Memory),
            "keyring" => Some(TokenStorage::Keyring),
            _ => None,
        }
    }

    pub fn is_persistent(self) -> bool {
        self == TokenStorage::Keyring
    }

    /// Build the store selected by this policy.
    pub fn open(self) -> Arc<dyn TokenStore> {
        match self {
            TokenStorage::Memory => Arc::new(MemoryTokenStore::new()),
            TokenStorage::Keyring => Arc::new(KeyringTokenStore::new()),
        }
    }
}
