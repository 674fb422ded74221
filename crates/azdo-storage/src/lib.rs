//! Secret storage using the OS keychain.
//!
//! Holds `AZURE_DEVOPS_*` / `AZURE_AD_*` values under the keychain service
//! `azure-devops-mcp`, one entry per variable name:
//!
//! - **macOS**: Keychain Services
//! - **Windows**: Credential Manager
//! - **Linux**: Secret Service (GNOME Keyring / KWallet)
//!
//! Both stores also act as the credential resolver's fallback lookup.
//!
//! # Example
//!
//! ```ignore
//! use azdo_storage::{KeychainStore, CredentialStore};
//!
//! let store = KeychainStore::new();
//! store.store("AZURE_DEVOPS_PAT", "xxxx")?;
//! assert!(store.exists("AZURE_DEVOPS_PAT"));
//! store.delete("AZURE_DEVOPS_PAT")?;
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use azdo_core::credentials::{names, SecretLookup};
use azdo_core::{Error, Result};
use keyring::Entry;
use tracing::{debug, warn};

/// Service name used in OS keychain.
pub const SERVICE_NAME: &str = "azure-devops-mcp";

/// Credential storage trait.
///
/// Implementations can use OS keychain, in-memory storage (for testing),
/// or other backends.
pub trait CredentialStore: Send + Sync {
    /// Store a secret under its variable name (e.g. `AZURE_DEVOPS_PAT`).
    fn store(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a stored secret.
    ///
    /// Returns `Ok(None)` if the entry doesn't exist.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Delete a stored secret.
    ///
    /// Returns `Ok(())` even if the entry didn't exist.
    fn delete(&self, key: &str) -> Result<()>;

    /// Check if a secret exists.
    fn exists(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }
}

/// Reject names the resolver never reads.
pub fn validate_name(name: &str) -> Result<()> {
    if names::ALL.contains(&name) {
        Ok(())
    } else {
        Err(Error::Storage(format!(
            "Unknown secret '{}'. Expected one of: {}",
            name,
            names::ALL.join(", ")
        )))
    }
}

/// Presence of every known name in `store`, in resolver order.
pub fn status(store: &dyn CredentialStore) -> Vec<(&'static str, bool)> {
    names::ALL
        .iter()
        .map(|name| (*name, store.exists(name)))
        .collect()
}

// =============================================================================
// KeychainStore - OS Keychain implementation
// =============================================================================

/// Secret store backed by the OS keychain.
#[derive(Debug)]
pub struct KeychainStore {
    service_name: String,
}

impl KeychainStore {
    /// Create a new keychain store with the default service name.
    pub fn new() -> Self {
        Self {
            service_name: SERVICE_NAME.to_string(),
        }
    }

    /// Create a keychain store with a custom service name.
    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn make_entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key).map_err(|e| {
            Error::Storage(format!(
                "Failed to create keychain entry for '{}': {}",
                key, e
            ))
        })
    }
}

impl Default for KeychainStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeychainStore {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        debug!(key = key, "Storing secret in keychain");

        self.make_entry(key)?
            .set_password(value)
            .map_err(|e| Error::Storage(format!("Failed to store secret '{}': {}", key, e)))
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        debug!(key = key, "Retrieving secret from keychain");

        match self.make_entry(key)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => {
                debug!(key = key, "Secret not found");
                Ok(None)
            }
            Err(e) => {
                warn!(key = key, error = %e, "Failed to retrieve secret");
                Err(Error::Storage(format!(
                    "Failed to retrieve secret '{}': {}",
                    key, e
                )))
            }
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        debug!(key = key, "Deleting secret from keychain");

        match self.make_entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => {
                debug!(key = key, "Secret was already deleted");
                Ok(())
            }
            Err(e) => Err(Error::Storage(format!(
                "Failed to delete secret '{}': {}",
                key, e
            ))),
        }
    }
}

impl SecretLookup for KeychainStore {
    fn lookup(&self, name: &str) -> Result<Option<String>> {
        self.get(name)
    }
}

// =============================================================================
// MemoryStore - In-memory implementation for testing
// =============================================================================

/// In-memory secret store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    credentials: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with secrets.
    pub fn with_credentials(credentials: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            credentials: RwLock::new(credentials.into_iter().collect()),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        let mut creds = self
            .credentials
            .write()
            .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))?;
        creds.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let creds = self
            .credentials
            .read()
            .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))?;
        Ok(creds.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut creds = self
            .credentials
            .write()
            .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))?;
        creds.remove(key);
        Ok(())
    }
}

impl SecretLookup for MemoryStore {
    fn lookup(&self, name: &str) -> Result<Option<String>> {
        self.get(name)
    }
}
