//! Subject extraction from access tokens
//!
//! Only the payload is decoded. The token was just issued to us by the
//! identity provider over TLS, and the services we forward it to verify the
//! signature themselves.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use insight_core::domain::ClientError;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
}

/// Returns the `sub` claim of a JWT access token
pub fn subject(access_token: &str) -> Result<String, ClientError> {
    let payload = access_token
        .split('.')
        .nth(1)
        .ok_or_else(|| ClientError::Auth("access token is not a JWT".to_string()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClientError::Auth(format!("access token payload is not base64url: {e}")))?;

    let claims: Claims = serde_json::from_slice(&bytes)
        .map_err(|e| ClientError::Auth(format!("access token payload is not JSON: {e}")))?;

    claims
        .sub
        .filter(|sub| !sub.is_empty())
        .ok_or_else(|| ClientError::Auth("access token has no subject claim".to_string()))
}

#[cfg(test)]
pub(crate) fn encode_test_token(sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}","exp":4102444800}}"#));
    format!("{header}.{payload}.signature")
}
