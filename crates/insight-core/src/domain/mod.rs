//! Domain entities
//!
//! This module contains the core domain types for Insight:
//! - Newtypes for inode identifiers and names
//! - Inode records of the remote namespace
//! - The persisted token record and derived storage credentials
//! - Error taxonomy shared by all ports

pub mod errors;
pub mod inode;
pub mod newtypes;
pub mod tokens;

// Re-export commonly used types
pub use errors::{ClientError, DomainError};
pub use inode::{Inode, InodeType, NewInode};
pub use newtypes::{InodeId, InodeName};
pub use tokens::{StorageCredentials, Tokens};
