//! Configuration module for Insight.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, environment overrides, validation, defaults, and a builder
//! pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for the Insight client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub oidc: OidcConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub credentials: CredentialsConfig,
    pub logging: LoggingConfig,
}

/// Directory API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the inode directory API.
    pub endpoint: String,
}

/// OpenID-Connect identity provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    /// Realm base URL; `/auth/device` and `/token` are appended.
    pub endpoint: String,
    pub client_id: String,
    /// Pre-shared secret. When set, the client-credentials grant is used
    /// instead of the interactive device-code grant.
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
}

/// Object storage and federation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint URL.
    pub endpoint: String,
    /// Web-identity federation (STS) endpoint URL.
    pub sts_endpoint: String,
    pub bucket: String,
    pub region: Option<String>,
    /// Role ARN for `AssumeRoleWithWebIdentity`. Required by AWS, optional for MinIO.
    pub identity_role: Option<String>,
    /// Lifetime requested for temporary storage credentials.
    pub session_duration_secs: u32,
}

/// What the tree synchronizer does when a single entry fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the walk at the first error and return it.
    #[default]
    Abort,
    /// Log and record the error, then continue with the next sibling.
    Continue,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Abort => "abort",
            FailurePolicy::Continue => "continue",
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(FailurePolicy::Abort),
            "continue" => Ok(FailurePolicy::Continue),
            other => Err(format!(
                "invalid failure policy '{other}'; valid options: abort, continue"
            )),
        }
    }
}

/// Tree synchronization settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub failure_policy: FailurePolicy,
    /// Re-upload files whose inode exists but was never marked uploaded.
    pub resume_pending_uploads: bool,
}

/// Token storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Keyring service name.
    pub service: String,
    /// File used when no keyring backend is available.
    pub plaintext_path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load() / save()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/insight/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("insight")
            .join("config.yaml")
    }

    /// OIDC device authorization endpoint.
    pub fn device_endpoint(&self) -> String {
        format!("{}/auth/device", self.oidc.endpoint.trim_end_matches('/'))
    }

    /// OIDC token endpoint.
    pub fn token_endpoint(&self) -> String {
        format!("{}/token", self.oidc.endpoint.trim_end_matches('/'))
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://insight:8080".to_string(),
        }
    }
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://secure.ftm.nl/realms/insight/protocol/openid-connect".to_string(),
            client_id: "insight".to_string(),
            client_secret: None,
            scopes: vec!["openid".to_string()],
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://insight:9000".to_string(),
            sts_endpoint: "https://insight:9000".to_string(),
            bucket: "insight".to_string(),
            region: None,
            identity_role: None,
            session_duration_secs: 3600,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            service: "insight".to_string(),
            plaintext_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("insight")
                .join("token.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dotted keys and environment overrides
// ---------------------------------------------------------------------------

/// Settable keys as `(section, option)`, options spelled the way users type them.
pub const CONFIG_KEYS: &[(&str, &str)] = &[
    ("api", "endpoint"),
    ("oidc", "endpoint"),
    ("oidc", "client-id"),
    ("oidc", "client-secret"),
    ("oidc", "scopes"),
    ("storage", "endpoint"),
    ("storage", "sts-endpoint"),
    ("storage", "bucket"),
    ("storage", "region"),
    ("storage", "identity-role"),
    ("storage", "session-duration-secs"),
    ("sync", "failure-policy"),
    ("sync", "resume-pending-uploads"),
    ("credentials", "service"),
    ("credentials", "plaintext-path"),
    ("logging", "level"),
];

/// Environment variable overriding `section.option`, e.g. `INSIGHT_OIDC_CLIENT_SECRET`.
pub fn env_var_name(section: &str, option: &str) -> String {
    format!("INSIGHT_{section}_{option}")
        .replace('-', "_")
        .to_uppercase()
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl Config {
    /// Set a value by dotted key (`oidc.client-id` or `oidc.client_id`).
    pub fn set_value(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let normalized = key.replace('_', "-");
        let (section, option) = normalized
            .split_once('.')
            .ok_or_else(|| anyhow::anyhow!("invalid key '{key}'; expected <section>.<option>"))?;

        match (section, option) {
            ("api", "endpoint") => self.api.endpoint = value.to_string(),
            ("oidc", "endpoint") => self.oidc.endpoint = value.to_string(),
            ("oidc", "client-id") => self.oidc.client_id = value.to_string(),
            ("oidc", "client-secret") => self.oidc.client_secret = optional(value),
            ("oidc", "scopes") => {
                self.oidc.scopes = value
                    .split([',', ' '])
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            ("storage", "endpoint") => self.storage.endpoint = value.to_string(),
            ("storage", "sts-endpoint") => self.storage.sts_endpoint = value.to_string(),
            ("storage", "bucket") => self.storage.bucket = value.to_string(),
            ("storage", "region") => self.storage.region = optional(value),
            ("storage", "identity-role") => self.storage.identity_role = optional(value),
            ("storage", "session-duration-secs") => {
                self.storage.session_duration_secs = value
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}"))?
            }
            ("sync", "failure-policy") => {
                self.sync.failure_policy = value.parse().map_err(|e: String| anyhow::anyhow!(e))?
            }
            ("sync", "resume-pending-uploads") => {
                self.sync.resume_pending_uploads = value
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}"))?
            }
            ("credentials", "service") => self.credentials.service = value.to_string(),
            ("credentials", "plaintext-path") => {
                self.credentials.plaintext_path = PathBuf::from(value)
            }
            ("logging", "level") => self.logging.level = value.to_string(),
            _ => anyhow::bail!("unknown configuration key '{key}'"),
        }
        Ok(())
    }

    /// Apply overrides from `INSIGHT_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides using `lookup` to resolve variable names.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (section, option) in CONFIG_KEYS {
            if let Some(value) = lookup(&env_var_name(section, option)) {
                self.set_value(&format!("{section}.{option}"), &value)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"oidc.client_id"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        Ok(parsed) => errors.push(ValidationError {
            field: field.into(),
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        }),
        Err(e) => errors.push(ValidationError {
            field: field.into(),
            message: format!("invalid URL '{value}': {e}"),
        }),
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- endpoints ---
        check_url(&mut errors, "api.endpoint", &self.api.endpoint);
        check_url(&mut errors, "oidc.endpoint", &self.oidc.endpoint);
        check_url(&mut errors, "storage.endpoint", &self.storage.endpoint);
        check_url(&mut errors, "storage.sts_endpoint", &self.storage.sts_endpoint);

        // --- oidc ---
        if self.oidc.client_id.trim().is_empty() {
            errors.push(ValidationError {
                field: "oidc.client_id".into(),
                message: "must not be empty".into(),
            });
        }

        // --- storage ---
        if self.storage.bucket.trim().is_empty() {
            errors.push(ValidationError {
                field: "storage.bucket".into(),
                message: "must not be empty".into(),
            });
        }
        // STS accepts 900 seconds up to 12 hours
        if !(900..=43_200).contains(&self.storage.session_duration_secs) {
            errors.push(ValidationError {
                field: "storage.session_duration_secs".into(),
                message: "must be in range 900..=43200".into(),
            });
        }

        // --- credentials ---
        if self.credentials.service.trim().is_empty() {
            errors.push(ValidationError {
                field: "credentials.service".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use insight_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .api_endpoint("https://insight.example.org")
///     .oidc_client_id("insight-cli")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.api.endpoint = endpoint.into();
        self
    }

    pub fn oidc_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.oidc.endpoint = endpoint.into();
        self
    }

    pub fn oidc_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.config.oidc.client_id = client_id.into();
        self
    }

    pub fn oidc_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.oidc.client_secret = Some(secret.into());
        self
    }

    pub fn storage_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.storage.endpoint = endpoint.into();
        self
    }

    pub fn storage_sts_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.storage.sts_endpoint = endpoint.into();
        self
    }

    pub fn storage_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.storage.bucket = bucket.into();
        self
    }

    pub fn storage_region(mut self, region: impl Into<String>) -> Self {
        self.config.storage.region = Some(region.into());
        self
    }

    pub fn storage_identity_role(mut self, role: impl Into<String>) -> Self {
        self.config.storage.identity_role = Some(role.into());
        self
    }

    pub fn storage_session_duration_secs(mut self, secs: u32) -> Self {
        self.config.storage.session_duration_secs = secs;
        self
    }

    pub fn sync_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.sync.failure_policy = policy;
        self
    }

    pub fn sync_resume_pending_uploads(mut self, resume: bool) -> Self {
        self.config.sync.resume_pending_uploads = resume;
        self
    }

    pub fn credentials_service(mut self, service: impl Into<String>) -> Self {
        self.config.credentials.service = service.into();
        self
    }

    pub fn credentials_plaintext_path(mut self, path: PathBuf) -> Self {
        self.config.credentials.plaintext_path = path;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the [`Config`] without validation.
    pub fn build(self) -> Config {
        self.config
    }

    /// Consume the builder, validate, and return the [`Config`] or errors.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
