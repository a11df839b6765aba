//! Insight Sync - Tree synchronization
//!
//! Provides:
//! - Recursive upload of a local file or directory into the inode directory
//! - Recursive download of an inode subtree into a local directory
//! - Idempotent re-runs: existing inodes are detected through create conflicts
//!
//! Both walks are written against the core ports only, so they run unchanged
//! against the HTTP adapters or in-memory fakes.
//!
//! ## Modules
//!
//! - [`engine`] - [`engine::TreeSynchronizer`], the upload walk
//! - [`download`] - [`download::TreeDownloader`], the download walk

pub mod download;
pub mod engine;


use std::path::{Path, PathBuf};

use insight_core::domain::{ClientError, DomainError};
use thiserror::Error;

pub use download::{DownloadReport, TreeDownloader};
pub use engine::{SyncFailure, SyncOptions, SyncReport, TreeSynchronizer};

/// Errors that abort a synchronization walk
#[derive(Debug, Error)]
pub enum SyncError {
    /// A local file or directory could not be read or written
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// A local name cannot be used as an inode name, or an inode name cannot
    /// be used as a local path segment
    #[error("Invalid name at {path}: {source}")]
    InvalidName {
        path: PathBuf,
        #[source]
        source: DomainError,
    },

    /// The directory API or object storage failed for this entry
    #[error("{path}: {source}")]
    Client {
        path: PathBuf,
        #[source]
        source: ClientError,
    },
}

impl SyncError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            SyncError::PathNotFound(path.to_path_buf())
        } else {
            SyncError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub(crate) fn client(path: &Path, source: ClientError) -> Self {
        SyncError::Client {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The client error behind this failure, if any
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            SyncError::Client { source, .. } => Some(source),
            _ => None,
        }
    }
}
