use std::sync::{PoisonError, RwLock};

use ::keyring::Entry;
use thiserror::Error;
use tracing::{debug, warn};

use super::TokenStore;

const KEYRING_SERVICE: &str = "chatweb";
const KEYRING_ACCOUNT: &str = "auth-token";

/// Keyring failure, split by whether retrying later may help.
///
/// A locked or unreachable credential service is recoverable; anything else
/// (bad attributes, ambiguous entries) is reported as permanent.
#[derive(Debug, Error)]
pub enum KeyringAccessError {
    #[error("{0}")]
    Recoverable(#[source] ::keyring::Error),
    #[error("{0}")]
    Permanent(#[source] ::keyring::Error),
}

impl KeyringAccessError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeyringAccessError::Recoverable(_))
    }
}

impl From<::keyring::Error> for KeyringAccessError {
    fn from(err: ::keyring::Error) -> Self {
        match err {
            ::keyring::Error::PlatformFailure(_) | ::keyring::Error::NoStorageAccess(_) => {
                KeyringAccessError::Recoverable(err)
            }
            other => KeyringAccessError::Permanent(other),
        }
    }
}

#[derive(Debug, Clone)]
enum Cached {
    Unloaded,
    Present(String),
    Missing,
}

/// Token holder backed by the platform keyring.
///
/// The keyring is read once, lazily, and mirrored in memory afterwards.
/// Writes go to both; a failing keyring never loses the in-memory value for
/// the current process.
pub struct KeyringTokenStore {
    service: String,
    account: String,
    cache: RwLock<Cached>,
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_entry(KEYRING_SERVICE, KEYRING_ACCOUNT)
    }

    pub fn with_entry(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
            cache: RwLock::new(Cached::Unloaded),
        }
    }

    fn entry(&self) -> Result<Entry, KeyringAccessError> {
        Entry::new(&self.service, &self.account).map_err(KeyringAccessError::from)
    }

    fn load(&self) -> Result<Option<String>, KeyringAccessError> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(::keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn store(&self, cached: Cached) {
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = cached;
    }
}

impl TokenStore for KeyringTokenStore {
    fn get_token(&self) -> Option<String> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match cached {
            Cached::Present(token) => return Some(token),
            Cached::Missing => return None,
            Cached::Unloaded => {}
        }

        match self.load() {
            Ok(Some(token)) => {
                debug!(service = %self.service, "Loaded token from keyring");
                self.store(Cached::Present(token.clone()));
                Some(token)
            }
            Ok(None) => {
                self.store(Cached::Missing);
                None
            }
            Err(err) => {
                warn!(
                    service = %self.service,
                    recoverable = err.is_recoverable(),
                    error = %err,
                    "Keyring lookup failed"
                );
                // Leave recoverable failures unloaded so the next call retries.
                if !err.is_recoverable() {
                    self.store(Cached::Missing);
                }
                None
            }
        }
    }

    fn set_token(&self, token: &str) {
        self.store(Cached::Present(token.to_string()));
        let result = self
            .entry()
            .and_then(|entry| entry.set_password(token).map_err(KeyringAccessError::from));
        if let Err(err) = result {
            warn!(service = %self.service, error = %err, "Failed to persist token to keyring");
        }
    }

    fn remove_token(&self) {
        self.store(Cached::Missing);
        let result = self.entry().and_then(|entry| match entry.delete_credential() {
            Ok(()) | Err(::keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(KeyringAccessError::from(err)),
        });
        if let Err(err) = result {
            warn!(service = %self.service, error = %err, "Failed to remove token from keyring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_failures_are_recoverable() {
        let err = KeyringAccessError::from(::keyring::Error::PlatformFailure("locked".into()));
        assert!(err.is_recoverable());

        let err = KeyringAccessError::from(::keyring::Error::NoStorageAccess("denied".into()));
        assert!(err.is_recoverable());
    }

    #[test]
    fn other_failures_are_permanent() {
        let err = KeyringAccessError::from(::keyring::Error::NoEntry);
        assert!(!err.is_recoverable());

        let err = KeyringAccessError::from(::keyring::Error::TooLong("user".to_string(), 255));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn token_lifecycle_against_mock_keyring() {
        ::keyring::set_default_credential_builder(::keyring::mock::default_credential_builder());
        let store = KeyringTokenStore::with_entry("chatweb-test", "lifecycle");

        assert_eq!(store.get_token(), None);

        store.set_token("t1");
        assert_eq!(store.get_token().as_deref(), Some("t1"));

        store.set_token("t2");
        assert_eq!(store.get_token().as_deref(), Some("t2"));

        store.remove_token();
        assert_eq!(store.get_token(), None);

        // Removing an absent credential is not an error.
        store.remove_token();
        assert_eq!(store.get_token(), None);
    }
}
