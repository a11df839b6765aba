//! Insight API - adapters for the identity provider, directory API and object storage
//!
//! Provides async clients for:
//! - OIDC authentication (device-code and client-credentials grants, refresh)
//! - Web-identity federation for temporary object-storage credentials
//! - The inode directory API with transparent refresh-and-retry on 401
//! - Streaming uploads and downloads against S3-compatible storage
//!
//! ## Modules
//!
//! - [`auth`] - OIDC flows and the [`auth::TokenManager`] session state machine
//! - [`clock`] - System and manual implementations of the clock port
//! - [`credentials`] - Keyring and plaintext token stores
//! - [`directory`] - Inode directory client
//! - [`http`] - Authenticated HTTP client
//! - [`jwt`] - Subject extraction from access tokens
//! - [`storage`] - Object storage client
//! - [`sts`] - `AssumeRoleWithWebIdentity` exchange

pub mod auth;
pub mod clock;
pub mod credentials;
pub mod directory;
pub mod http;
pub mod jwt;
pub mod storage;
pub mod sts;

pub use auth::{DevicePrompt, TokenManager};
pub use credentials::{FallbackCredentialStore, TokenRepository};
pub use directory::InodeDirectoryClient;
pub use http::AuthenticatedClient;
pub use storage::ObjectStorageClient;
