//! Insight Core - Domain types, configuration and port definitions
//!
//! This crate is the hexagonal core of the Insight client:
//! - **Domain types** - `Inode`, `Tokens`, `StorageCredentials` and the `ClientError` taxonomy
//! - **Port definitions** - Traits implemented by adapter crates: `ICredentialStore`,
//!   `IInodeDirectory`, `IObjectStorage`, `IClock`
//! - **Configuration** - The YAML configuration file with environment overrides
//!
//! # Architecture
//!
//! Nothing in this crate talks to the network. The `insight-api` crate provides
//! the HTTP adapters and `insight-sync` drives the ports to synchronize trees.

pub mod config;
pub mod domain;
pub mod ports;
