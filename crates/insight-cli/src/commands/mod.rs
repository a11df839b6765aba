//! Command implementations
//!
//! Every command loads the configuration through [`CliContext`] and builds
//! only the clients it needs.

pub mod auth;
pub mod configure;
pub mod file;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use insight_api::storage::S3StoreFactory;
use insight_api::{AuthenticatedClient, InodeDirectoryClient, ObjectStorageClient, TokenManager};
use insight_core::config::Config;

use crate::output::{OutputFormat, OutputFormatter};

/// Global options shared by all commands
pub struct CliContext {
    pub config_path: PathBuf,
    pub format: OutputFormat,
}

impl CliContext {
    pub fn new(config_path: PathBuf, format: OutputFormat) -> Self {
        Self {
            config_path,
            format,
        }
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        self.format.formatter()
    }

    /// The configuration file as stored, without environment overrides
    pub fn file_config(&self) -> Config {
        Config::load_or_default(&self.config_path)
    }

    /// The effective configuration: file, then `INSIGHT_*` overrides
    pub fn config(&self) -> Result<Config> {
        let mut config = self.file_config();
        config
            .apply_env_overrides()
            .context("Invalid INSIGHT_* environment override")?;
        Ok(config)
    }

    /// Clients wired from the effective configuration
    pub fn connect(&self) -> Result<Services> {
        Services::from_config(&self.config()?)
    }
}

/// The token manager and the clients that share it
pub struct Services {
    pub tokens: Arc<TokenManager>,
    pub directory: Arc<InodeDirectoryClient>,
    pub storage: Arc<ObjectStorageClient>,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self> {
        let tokens = Arc::new(TokenManager::from_config(config));
        let http = AuthenticatedClient::new(&config.api.endpoint, tokens.clone())
            .context("Failed to create API client")?;
        let directory = Arc::new(InodeDirectoryClient::new(http));
        let storage = Arc::new(ObjectStorageClient::new(
            tokens.clone(),
            Arc::new(S3StoreFactory::from_config(&config.storage)),
        ));
        Ok(Self {
            tokens,
            directory,
            storage,
        })
    }
}
