//! Domain error types
//!
//! [`ClientError`] is the error taxonomy shared by every port. Conflicts are
//! an expected outcome of creating inodes concurrently and are always
//! resolved by a lookup; the other variants abort the current operation.

use thiserror::Error;

use super::newtypes::InodeId;

/// Errors raised while validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid inode identifier
    #[error("Invalid inode ID: {0}")]
    InvalidInodeId(String),

    /// Invalid inode name
    #[error("Invalid inode name: {0}")]
    InvalidInodeName(String),

    /// A local path has no usable final component
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Errors returned by the directory, storage and authentication ports
#[derive(Debug, Error)]
pub enum ClientError {
    /// No usable token: not logged in, or refresh and re-acquisition failed
    #[error("Not authenticated: {0}")]
    Auth(String),

    /// An inode with the same `(parent_id, name)` already exists
    #[error("Inode '{name}' already exists")]
    Conflict {
        /// Name that collided
        name: String,
        /// Parent of the colliding inode (`None` for the root)
        parent_id: Option<InodeId>,
    },

    /// The requested inode does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success response from the directory API
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Message from the structured error body, or the raw body
        message: String,
    },

    /// The object store or credential exchange rejected the request
    #[error("Storage error: {0}")]
    Storage(String),

    /// The object store or credential exchange could not be reached, or
    /// failed mid-transfer
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The device-code grant expired before the user completed it
    #[error("Device authorization expired before it was completed")]
    AcquisitionTimeout,

    /// The user explicitly denied the device-code grant
    #[error("Device authorization was denied")]
    AccessDenied,

    /// Missing or invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid domain value (bad name, bad ID)
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ClientError {
    /// Returns true for naming collisions, which callers resolve by lookup
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict { .. })
    }

    /// Builds an [`ClientError::Api`] from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        ClientError::Api {
            status,
            message: message.into(),
        }
    }
}
