// ── Persisted credentials ──
//
// The controller reads and writes exactly two string entries: the instance
// URL and the long-lived access token. Where they live (OS keyring, memory)
// is up to the implementation handed in by the caller.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Key of the stored instance URL.
pub const URL_KEY: &str = "ha_url";
/// Key of the stored access token.
pub const TOKEN_KEY: &str = "ha_token";

/// A credential store could not write or delete an entry.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("cannot write credential '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("cannot remove credential '{key}': {source}")]
    Remove {
        key: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl CredentialError {
    pub fn write(key: &str, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Write {
            key: key.to_owned(),
            source: Box::new(source),
        }
    }

    pub fn remove(key: &str, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Remove {
            key: key.to_owned(),
            source: Box::new(source),
        }
    }
}

/// Opaque key-value string store for connection credentials.
///
/// Implementations must be cheap and non-blocking enough to call from
/// async code. An entry that cannot be read is reported as absent; write
/// failures are logged by the controller and never abort a connect.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError>;
    /// Removing an absent entry succeeds.
    fn remove(&self, key: &str) -> Result<(), CredentialError>;
}

/// In-process store; contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.entries().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CredentialError> {
        self.entries().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.get(TOKEN_KEY), None);

        store.set(TOKEN_KEY, "abc").ok();
        assert_eq!(store.get(TOKEN_KEY).as_deref(), Some("abc"));

        store.remove(TOKEN_KEY).ok();
        assert_eq!(store.get(TOKEN_KEY), None);
        assert!(store.remove(TOKEN_KEY).is_ok());
    }

    #[test]
    fn error_keeps_key_and_source() {
        let err = CredentialError::write(
            TOKEN_KEY,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
        );
        assert_eq!(err.to_string(), "cannot write credential 'ha_token': locked");
        assert!(StdError::source(&err).is_some());
    }
}
