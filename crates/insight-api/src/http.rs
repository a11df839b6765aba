//! Authenticated HTTP client
//!
//! Wraps `reqwest::Client` with the current bearer token. A 401 from a URL
//! under the directory API base triggers one refresh and one retry; a second
//! 401 is returned to the caller as is. A 401 from any other host is never
//! treated as an expired session.

use std::sync::Arc;

use insight_core::domain::ClientError;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode};
use tracing::{debug, info};
use url::Url;

/// Supplies bearer tokens and refreshes them on demand
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// The current access token
    async fn access_token(&self) -> Result<String, ClientError>;

    /// A token newer than `stale`
    async fn refresh(&self, stale: &str) -> Result<String, ClientError>;
}

/// HTTP client for the directory API
#[derive(Clone)]
pub struct AuthenticatedClient {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenSource>,
}

impl AuthenticatedClient {
    /// Creates a client for the API rooted at `base_url`
    pub fn new(base_url: &str, tokens: Arc<dyn TokenSource>) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Config(format!("invalid API endpoint '{base_url}': {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            tokens,
        })
    }

    /// Resolves `path` (e.g. `inodes`) against the API base
    pub fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::Config(format!("invalid API path '{path}': {e}")))
    }

    /// Starts a request to an API path
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        Ok(self.client.request(method, self.url(path)?))
    }

    /// True when `url` lies under the API base (same origin and path prefix)
    pub fn targets_api(&self, url: &Url) -> bool {
        url.scheme() == self.base_url.scheme()
            && url.host_str() == self.base_url.host_str()
            && url.port_or_known_default() == self.base_url.port_or_known_default()
            && url.path().starts_with(self.base_url.path())
    }

    /// Sends a request with the bearer token, refreshing once on 401
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let request = builder
            .build()
            .map_err(|e| ClientError::Api {
                status: 0,
                message: format!("failed to build request: {e}"),
            })?;
        let retry = request.try_clone();

        let token = self.tokens.access_token().await?;
        let response = self.execute(request, &token).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        if !self.targets_api(response.url()) {
            debug!(url = %response.url(), "401 from outside the API; not refreshing");
            return Ok(response);
        }
        let Some(retry) = retry else {
            debug!("Request body cannot be replayed; not retrying");
            return Ok(response);
        };

        info!(url = %response.url(), "Access token rejected, refreshing and retrying once");
        let token = self.tokens.refresh(&token).await?;
        self.execute(retry, &token).await
    }

    async fn execute(&self, mut request: Request, token: &str) -> Result<Response, ClientError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ClientError::Auth("access token is not a valid header value".to_string()))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        let method = request.method().clone();
        let url = request.url().clone();
        let response = self.client.execute(request).await.map_err(|e| ClientError::Api {
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: format!("request failed: {e}"),
        })?;
        debug!(%method, %url, status = response.status().as_u16(), "API response");
        Ok(response)
    }

    /// The underlying client, for requests to other hosts
    pub fn inner(&self) -> &Client {
        &self.client
    }
}
