//! Credential store port
//!
//! Persists the single serialized token record. Implementations are
//! synchronous: both the OS keyring and a local file are quick blocking
//! calls that happen only around login, logout and refresh.

use thiserror::Error;

use crate::domain::ClientError;

/// Errors from a credential store backend
#[derive(Debug, Error)]
pub enum CredentialStoreError {
    /// The backend is not usable on this machine (no secret service, locked keychain)
    #[error("No credential backend available: {0}")]
    NoBackend(String),

    /// Reading or writing the plaintext file failed
    #[error("Credential file error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored record is not valid JSON
    #[error("Invalid stored credentials: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure
    #[error("Credential backend error: {0}")]
    Backend(String),
}

impl From<CredentialStoreError> for ClientError {
    fn from(err: CredentialStoreError) -> Self {
        ClientError::Auth(err.to_string())
    }
}

/// Port trait for storing the serialized token record
pub trait ICredentialStore: Send + Sync {
    /// Returns the stored record, or `None` when nothing is stored
    fn get(&self) -> Result<Option<String>, CredentialStoreError>;

    /// Stores (or replaces) the record
    fn set(&self, secret: &str) -> Result<(), CredentialStoreError>;

    /// Removes the record; removing a missing record is not an error
    fn delete(&self) -> Result<(), CredentialStoreError>;

    /// Short backend name for status output
    fn backend_name(&self) -> &'static str;
}
