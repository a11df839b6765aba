//! Token storage backends
//!
//! ## Components
//!
//! - [`KeyringCredentialStore`] - Secret stored in the OS keyring
//! - [`PlaintextCredentialStore`] - Secret stored in a `0600` file
//! - [`FallbackCredentialStore`] - Keyring first, plaintext when no keyring backend exists
//! - [`TokenRepository`] - JSON (de)serialization of [`Tokens`] on top of any store

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use insight_core::config::CredentialsConfig;
use insight_core::domain::Tokens;
use insight_core::ports::{CredentialStoreError, ICredentialStore};
use tracing::{debug, info, warn};

/// Keyring user name under which the token record is stored
const KEYRING_USER: &str = "token";

// ============================================================================
// KeyringCredentialStore
// ============================================================================

/// Stores the token record in the system keyring
///
/// Uses the `keyring` crate to reach the OS credential store (GNOME Keyring,
/// KDE Wallet, macOS Keychain).
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
    user: String,
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            user: KEYRING_USER.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, CredentialStoreError> {
        keyring::Entry::new(&self.service, &self.user).map_err(map_keyring_error)
    }
}

/// Separates "no usable backend here" from other keyring failures
fn map_keyring_error(err: keyring::Error) -> CredentialStoreError {
    match err {
        keyring::Error::PlatformFailure(e) | keyring::Error::NoStorageAccess(e) => {
            CredentialStoreError::NoBackend(e.to_string())
        }
        other => CredentialStoreError::Backend(other.to_string()),
    }
}

impl ICredentialStore for KeyringCredentialStore {
    fn get(&self) -> Result<Option<String>, CredentialStoreError> {
        match self.entry()?.get_password() {
            Ok(secret) => {
                debug!(service = %self.service, "Loaded token record from keyring");
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn set(&self, secret: &str) -> Result<(), CredentialStoreError> {
        self.entry()?
            .set_password(secret)
            .map_err(map_keyring_error)?;
        debug!(service = %self.service, "Stored token record in keyring");
        Ok(())
    }

    fn delete(&self) -> Result<(), CredentialStoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "keyring"
    }
}

// ============================================================================
// PlaintextCredentialStore
// ============================================================================

/// Stores the token record in a file readable only by the owner
#[derive(Debug, Clone)]
pub struct PlaintextCredentialStore {
    path: PathBuf,
}

impl PlaintextCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ICredentialStore for PlaintextCredentialStore {
    fn get(&self) -> Result<Option<String>, CredentialStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(secret) => Ok(Some(secret)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, secret: &str) -> Result<(), CredentialStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.path)?;
        file.write_all(secret.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn delete(&self) -> Result<(), CredentialStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "plaintext"
    }
}

// ============================================================================
// FallbackCredentialStore
// ============================================================================

/// Uses the secure store, dropping to the plaintext store only when the
/// secure backend is unavailable. Every downgrade is logged.
pub struct FallbackCredentialStore {
    secure: Box<dyn ICredentialStore>,
    plaintext: Box<dyn ICredentialStore>,
}

impl FallbackCredentialStore {
    pub fn new(secure: Box<dyn ICredentialStore>, plaintext: Box<dyn ICredentialStore>) -> Self {
        Self { secure, plaintext }
    }

    /// Keyring service plus plaintext file, both taken from configuration
    pub fn from_config(config: &CredentialsConfig) -> Self {
        Self::new(
            Box::new(KeyringCredentialStore::new(config.service.clone())),
            Box::new(PlaintextCredentialStore::new(config.plaintext_path.clone())),
        )
    }
}

impl ICredentialStore for FallbackCredentialStore {
    fn get(&self) -> Result<Option<String>, CredentialStoreError> {
        match self.secure.get() {
            Ok(Some(secret)) => Ok(Some(secret)),
            Ok(None) => {
                let secret = self.plaintext.get()?;
                if secret.is_some() {
                    warn!("Token found only in the plaintext file, it moves to the keyring on next save");
                }
                Ok(secret)
            }
            Err(CredentialStoreError::NoBackend(reason)) => {
                let secret = self.plaintext.get()?;
                if secret.is_some() {
                    warn!(%reason, "No suitable keyring backend, reading token from plaintext");
                }
                Ok(secret)
            }
            Err(e) => Err(e),
        }
    }

    fn set(&self, secret: &str) -> Result<(), CredentialStoreError> {
        match self.secure.set(secret) {
            Ok(()) => {
                // A copy left from an earlier downgrade must not outlive the keyring entry
                if let Err(e) = self.plaintext.delete() {
                    warn!(error = %e, "Could not remove plaintext token copy");
                }
                Ok(())
            }
            Err(CredentialStoreError::NoBackend(reason)) => {
                warn!(%reason, "No suitable keyring backend, storing token as plaintext");
                self.plaintext.set(secret)
            }
            Err(e) => Err(e),
        }
    }

    fn delete(&self) -> Result<(), CredentialStoreError> {
        if let Err(e) = self.secure.delete() {
            debug!(error = %e, "Could not remove token from {}", self.secure.backend_name());
        }
        if let Err(e) = self.plaintext.delete() {
            debug!(error = %e, "Could not remove token from {}", self.plaintext.backend_name());
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "keyring+plaintext"
    }
}

// ============================================================================
// TokenRepository
// ============================================================================

/// Reads and writes the [`Tokens`] record as JSON
#[derive(Clone)]
pub struct TokenRepository {
    store: Arc<dyn ICredentialStore>,
}

impl TokenRepository {
    pub fn new(store: Arc<dyn ICredentialStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Result<Option<Tokens>, CredentialStoreError> {
        match self.store.get()? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, tokens: &Tokens) -> Result<(), CredentialStoreError> {
        let json = serde_json::to_string(tokens)?;
        self.store.set(&json)
    }

    /// Removes the record; logout never fails because of it
    pub fn clear(&self) {
        match self.store.delete() {
            Ok(()) => info!("Removed stored token"),
            Err(e) => warn!(error = %e, "Could not remove stored token"),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}
