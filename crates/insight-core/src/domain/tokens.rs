//! Token record and derived storage credentials

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth tokens received from the identity provider
///
/// Persisted by the credential store as JSON. A record with a refresh token
/// belongs to an interactive (device-code) session; machine sessions
/// (client-credentials grant) have none and are re-acquired on expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Token for refreshing the access token without user interaction
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
    /// Token type reported by the provider, normally `bearer`
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Tokens {
    /// Returns true if the access token has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Interactive sessions hold a refresh token
    pub fn is_interactive(&self) -> bool {
        self.refresh_token.is_some()
    }
}

impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokens")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Temporary object-storage credentials obtained by web-identity federation
///
/// Held in memory only and bound to the subject of the access token they were
/// derived from.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
    pub expiry: Option<DateTime<Utc>>,
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}
