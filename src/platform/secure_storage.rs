use std::collections::HashMap;

use async_trait::async_trait;
use keyring::Entry;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Opaque key-value secret storage. Every operation replaces or reads a whole
/// value; there is no partial mutation.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn save(&self, key: &str, value: &str) -> Result<()>;
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// OS keychain backed store (macOS Keychain, Secret Service, Windows
/// Credential Manager) via `keyring`.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Runs a keychain call on the blocking pool; the platform APIs are
    /// synchronous and may wait on an unlock prompt.
    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T> + Send + 'static,
    {
        let service = self.service.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || op(Entry::new(&service, &key)?))
            .await
            .map_err(|e| Error::platform(format!("Keychain task failed: {}", e)))?
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn save(&self, key: &str, value: &str) -> Result<()> {
        debug!("Storing credential: {}", key);
        let value = value.to_string();
        let name = key.to_string();
        self.with_entry(key, move |entry| {
            entry.set_password(&value).map_err(|e| {
                warn!("Failed to store credential {}: {}", name, e);
                Error::SecureStorage(e)
            })
        })
        .await
    }

    async fn load(&self, key: &str) -> Result<Option<String>> {
        let name = key.to_string();
        self.with_entry(key, move |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => {
                debug!("No credential found for {}", name);
                Ok(None)
            }
            Err(e) => {
                warn!("Failed to read credential {}: {}", name, e);
                Err(Error::SecureStorage(e))
            }
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        debug!("Deleting credential: {}", key);
        self.with_entry(key, |entry| match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted
            Err(e) => Err(Error::SecureStorage(e)),
        })
        .await
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}
