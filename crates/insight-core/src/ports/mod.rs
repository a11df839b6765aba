//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. The synchronizer and the CLI depend on these
//! traits; the HTTP, keyring and object-store implementations live in
//! `insight-api`.
//!
//! ## Ports Overview
//!
//! - [`IClock`] - Time source and sleeping for bounded polling loops
//! - [`ICredentialStore`] - Persistence of the serialized token record
//! - [`IInodeDirectory`] - CRUD over the remote inode namespace
//! - [`IObjectStorage`] - Transfer of file bytes to and from object storage

pub mod clock;
pub mod credential_store;
pub mod directory;
pub mod object_storage;

pub use clock::IClock;
pub use credential_store::{CredentialStoreError, ICredentialStore};
pub use directory::{FolderOutcome, IInodeDirectory};
pub use object_storage::IObjectStorage;
