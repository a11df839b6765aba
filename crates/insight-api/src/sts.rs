//! Web-identity federation
//!
//! Exchanges an OIDC access token for temporary object-storage credentials
//! with `AssumeRoleWithWebIdentity`. AWS requires a role ARN; MinIO accepts
//! the call without one.

use chrono::{DateTime, Utc};
use insight_core::config::StorageConfig;
use insight_core::domain::{ClientError, StorageCredentials};
use serde::Deserialize;
use tracing::{debug, info};

const STS_ACTION: &str = "AssumeRoleWithWebIdentity";
const STS_VERSION: &str = "2011-06-15";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    assume_role_with_web_identity_result: AssumeRoleResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResult {
    credentials: CredentialsXml,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialsXml {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorResponse {
    error: ErrorXml,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorXml {
    code: Option<String>,
    message: Option<String>,
}

/// Client for the federation endpoint
#[derive(Debug, Clone)]
pub struct StsClient {
    http: reqwest::Client,
    endpoint: String,
    role_arn: Option<String>,
    duration_secs: u32,
}

impl StsClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            role_arn: None,
            duration_secs: 3600,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            role_arn: config.identity_role.clone(),
            duration_secs: config.session_duration_secs,
            ..Self::new(config.sts_endpoint.clone())
        }
    }

    /// Trades `access_token` for credentials scoped to `subject`
    pub async fn assume_role_with_web_identity(
        &self,
        access_token: &str,
        subject: &str,
    ) -> Result<StorageCredentials, ClientError> {
        let duration = self.duration_secs.to_string();
        let mut form = vec![
            ("Action", STS_ACTION),
            ("Version", STS_VERSION),
            ("DurationSeconds", duration.as_str()),
            ("RoleSessionName", subject),
            ("WebIdentityToken", access_token),
        ];
        if let Some(role) = &self.role_arn {
            form.push(("RoleArn", role.as_str()));
        }

        debug!(endpoint = %self.endpoint, role = ?self.role_arn, "Requesting storage credentials");

        let response = self
            .http
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| ClientError::StorageUnavailable(format!("credential exchange failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::StorageUnavailable(format!("credential exchange failed: {e}")))?;

        if !status.is_success() {
            return Err(rejection(status.as_u16(), &body));
        }

        let credentials = parse_credentials(&body)?;
        info!(
            access_key = %credentials.access_key,
            expiry = ?credentials.expiry,
            "Obtained storage credentials"
        );
        Ok(credentials)
    }
}

fn parse_credentials(body: &str) -> Result<StorageCredentials, ClientError> {
    let parsed: AssumeRoleResponse = quick_xml::de::from_str(body)
        .map_err(|e| ClientError::Storage(format!("invalid credential exchange response: {e}")))?;
    let creds = parsed.assume_role_with_web_identity_result.credentials;

    let expiry = creds
        .expiration
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(StorageCredentials {
        access_key: creds.access_key_id,
        secret_key: creds.secret_access_key,
        session_token: creds.session_token,
        expiry,
    })
}

fn describe_error(status: u16, body: &str) -> String {
    match quick_xml::de::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse { error }) => format!(
            "credential exchange rejected ({status}): {} {}",
            error.code.unwrap_or_default(),
            error.message.unwrap_or_default()
        )
        .trim_end()
        .to_string(),
        Err(_) => format!("credential exchange rejected ({status})"),
    }
}

/// Throttling and server failures may clear up; any other status is final
fn rejection(status: u16, body: &str) -> ClientError {
    let message = describe_error(status, body);
    if status == 429 || status >= 500 {
        ClientError::StorageUnavailable(message)
    } else {
        ClientError::Storage(message)
    }
}
