//! OIDC authentication and the token lifecycle
//!
//! Implements the device authorization grant (RFC 8628) for interactive
//! users and the client-credentials grant for machines holding a pre-shared
//! secret, plus silent refresh.
//!
//! ## Components
//!
//! - [`OidcSettings`] - Endpoints and client registration
//! - [`DeviceAuthorization`] - Device/user code pair returned by the provider
//! - [`DevicePrompt`] / [`BrowserPrompt`] - How the verification URL reaches the user
//! - [`OidcClient`] - Single grant requests and the bounded device-code polling loop
//! - [`TokenManager`] - Session state machine: acquire, refresh, persist, derive
//!   storage credentials
//!
//! ## Session states
//!
//! ```text
//! NoToken -> Acquiring -> Valid -> Refreshing -> Valid
//!                                            \-> ExpiredTerminal -> Acquiring
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use insight_core::config::Config;
use insight_core::domain::{ClientError, Tokens};
use insight_core::ports::IClock;
use oauth2::basic::{BasicClient, BasicErrorResponseType, BasicTokenResponse};
use oauth2::{
    ClientId, ClientSecret, EndpointNotSet, EndpointSet, RefreshToken, RequestTokenError, Scope,
    TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::SystemClock;
use crate::credentials::{FallbackCredentialStore, TokenRepository};
use crate::http::TokenSource;
use crate::jwt;
use crate::storage::{StorageSession, StorageSessionSource};
use crate::sts::StsClient;

/// Grant type for polling the token endpoint during the device flow
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Polling interval when the provider does not send one
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Added to the polling interval on every `slow_down` response
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Lifetime assumed when the provider omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

type TokenClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

// ============================================================================
// OidcSettings
// ============================================================================

/// Identity provider endpoints and client registration
#[derive(Clone)]
pub struct OidcSettings {
    pub device_endpoint: String,
    pub token_endpoint: String,
    pub client_id: String,
    /// When present, the client-credentials grant replaces the device flow
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
}

impl OidcSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device_endpoint: config.device_endpoint(),
            token_endpoint: config.token_endpoint(),
            client_id: config.oidc.client_id.clone(),
            client_secret: config.oidc.client_secret.clone(),
            scopes: config.oidc.scopes.clone(),
        }
    }
}

impl std::fmt::Debug for OidcSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcSettings")
            .field("device_endpoint", &self.device_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("scopes", &self.scopes)
            .finish()
    }
}

// ============================================================================
// DeviceAuthorization
// ============================================================================

#[derive(Debug, Deserialize)]
struct DeviceAuthorizationResponse {
    device_code: String,
    user_code: String,
    #[serde(default)]
    verification_uri: Option<String>,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    expires_in: u64,
    #[serde(default)]
    interval: Option<u64>,
}

/// An outstanding device authorization
#[derive(Debug, Clone)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: Option<String>,
    pub verification_uri_complete: Option<String>,
    /// Seconds between polls requested by the provider
    pub interval: u64,
    /// No poll is issued after this instant
    pub expires_at: DateTime<Utc>,
}

impl DeviceAuthorization {
    /// The URL the user should open, preferring the one with the code embedded
    pub fn url(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .or(self.verification_uri.as_deref())
            .unwrap_or_default()
    }
}

/// Delivers a device authorization to the user
pub trait DevicePrompt: Send + Sync {
    fn present(&self, authorization: &DeviceAuthorization);
}

/// Opens the verification URL in a browser and prints it on stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserPrompt;

impl DevicePrompt for BrowserPrompt {
    fn present(&self, authorization: &DeviceAuthorization) {
        let url = authorization.url();
        eprintln!("Open {url} to authorize this device.");
        eprintln!("Verification code: {}", authorization.user_code);

        if let Err(e) = webbrowser::open(url) {
            debug!(error = %e, "Could not open a browser");
        }
    }
}

// ============================================================================
// OidcClient
// ============================================================================

/// Outcome of one poll of the token endpoint
#[derive(Debug)]
pub enum DevicePoll {
    Authorized(Tokens),
    Pending,
    SlowDown,
    AccessDenied,
    Expired,
}

/// Why a refresh did not produce tokens
#[derive(Debug)]
pub enum RefreshFailure {
    /// The provider rejected the refresh token; a new grant is needed
    InvalidGrant,
    Failed(ClientError),
}

#[derive(Debug, Deserialize)]
struct DeviceTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Talks to the identity provider
pub struct OidcClient {
    settings: OidcSettings,
    http: reqwest::Client,
    clock: Arc<dyn IClock>,
}

impl OidcClient {
    pub fn new(settings: OidcSettings) -> Self {
        Self {
            settings,
            http: reqwest::Client::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn IClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &OidcSettings {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn IClock> {
        &self.clock
    }

    /// Machines with a pre-shared secret never prompt
    pub fn uses_client_credentials(&self) -> bool {
        self.settings.client_secret.is_some()
    }

    fn token_client(&self) -> Result<TokenClient, ClientError> {
        let token_url = TokenUrl::new(self.settings.token_endpoint.clone())
            .map_err(|e| ClientError::Config(format!("invalid token endpoint: {e}")))?;
        let mut client =
            BasicClient::new(ClientId::new(self.settings.client_id.clone())).set_token_uri(token_url);
        if let Some(secret) = &self.settings.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }
        Ok(client)
    }

    fn expires_at(&self, expires_in: Option<Duration>) -> DateTime<Utc> {
        let lifetime = expires_in
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));
        self.clock.now() + lifetime
    }

    fn tokens_from_response(
        &self,
        response: &BasicTokenResponse,
        previous_refresh: Option<&str>,
    ) -> Tokens {
        Tokens {
            access_token: response.access_token().secret().to_string(),
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().to_string())
                .or_else(|| previous_refresh.map(str::to_string)),
            expires_at: self.expires_at(response.expires_in()),
            token_type: response.token_type().as_ref().to_lowercase(),
        }
    }

    /// Starts a device authorization
    pub async fn request_device_authorization(&self) -> Result<DeviceAuthorization, ClientError> {
        info!(endpoint = %self.settings.device_endpoint, "Requesting device authorization");

        let scope = self.settings.scopes.join(" ");
        let mut form = vec![("client_id", self.settings.client_id.as_str())];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        let response = self
            .http
            .post(&self.settings.device_endpoint)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| ClientError::Auth(format!("device authorization request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ClientError::Auth(format!(
                "device authorization request failed with status {}",
                response.status()
            )));
        }

        let payload: DeviceAuthorizationResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Auth(format!("invalid device authorization response: {e}")))?;

        Ok(DeviceAuthorization {
            device_code: payload.device_code,
            user_code: payload.user_code,
            verification_uri: payload.verification_uri,
            verification_uri_complete: payload.verification_uri_complete,
            interval: payload.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            expires_at: self.clock.now() + chrono::Duration::seconds(payload.expires_in as i64),
        })
    }

    /// Polls the token endpoint once
    pub async fn poll_device_token(&self, device_code: &str) -> Result<DevicePoll, ClientError> {
        let response = self
            .http
            .post(&self.settings.token_endpoint)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", DEVICE_CODE_GRANT),
                ("client_id", self.settings.client_id.as_str()),
                ("device_code", device_code),
            ])
            .send()
            .await
            .map_err(|e| ClientError::Auth(format!("device token request failed: {e}")))?;

        let status = response.status();
        let payload: DeviceTokenResponse = response.json().await.map_err(|e| {
            ClientError::Auth(format!("invalid device token response ({status}): {e}"))
        })?;

        if let (true, Some(access_token)) = (status.is_success(), payload.access_token) {
            return Ok(DevicePoll::Authorized(Tokens {
                access_token,
                refresh_token: payload.refresh_token,
                expires_at: self.expires_at(payload.expires_in.map(Duration::from_secs)),
                token_type: payload
                    .token_type
                    .map(|t| t.to_lowercase())
                    .unwrap_or_else(|| "bearer".to_string()),
            }));
        }

        match payload.error.as_deref() {
            Some("authorization_pending") => Ok(DevicePoll::Pending),
            Some("slow_down") => Ok(DevicePoll::SlowDown),
            Some("access_denied") => Ok(DevicePoll::AccessDenied),
            Some("expired_token") => Ok(DevicePoll::Expired),
            Some(other) => Err(ClientError::Auth(format!(
                "device authorization failed: {other} {}",
                payload.error_description.unwrap_or_default()
            ))),
            None => Err(ClientError::Auth(format!(
                "device token response ({status}) has neither a token nor an error"
            ))),
        }
    }

    /// Polls until the user completes the authorization or it expires
    ///
    /// Polls immediately, then every `interval` seconds. Once the clock is
    /// past `expires_at` no further poll is sent.
    pub async fn wait_for_device_token(
        &self,
        authorization: &DeviceAuthorization,
    ) -> Result<Tokens, ClientError> {
        let mut interval = Duration::from_secs(authorization.interval.max(1));
        let mut attempts = 0u32;

        loop {
            if self.clock.now() > authorization.expires_at {
                warn!(attempts, "Device authorization expired");
                return Err(ClientError::AcquisitionTimeout);
            }

            attempts += 1;
            match self.poll_device_token(&authorization.device_code).await? {
                DevicePoll::Authorized(tokens) => {
                    info!(attempts, "Device authorization completed");
                    return Ok(tokens);
                }
                DevicePoll::Pending => {}
                DevicePoll::SlowDown => {
                    interval += SLOW_DOWN_STEP;
                    debug!(interval_secs = interval.as_secs(), "Provider asked to slow down");
                }
                DevicePoll::AccessDenied => return Err(ClientError::AccessDenied),
                DevicePoll::Expired => return Err(ClientError::AcquisitionTimeout),
            }

            self.clock.sleep(interval).await;
        }
    }

    /// Machine grant using the pre-shared secret
    pub async fn client_credentials(&self) -> Result<Tokens, ClientError> {
        info!("Requesting token with client credentials");

        let client = self.token_client()?;
        let mut request = client.exchange_client_credentials();
        for scope in &self.settings.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        let response = request
            .request_async(&self.http)
            .await
            .map_err(|e| ClientError::Auth(format!("client credentials grant failed: {e}")))?;

        Ok(self.tokens_from_response(&response, None))
    }

    /// Exchanges a refresh token for a new token pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<Tokens, RefreshFailure> {
        info!("Refreshing access token");

        let client = self.token_client().map_err(RefreshFailure::Failed)?;
        let result = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await;

        match result {
            Ok(response) => Ok(self.tokens_from_response(&response, Some(refresh_token))),
            Err(RequestTokenError::ServerResponse(err))
                if *err.error() == BasicErrorResponseType::InvalidGrant =>
            {
                Err(RefreshFailure::InvalidGrant)
            }
            Err(e) => Err(RefreshFailure::Failed(ClientError::Auth(format!(
                "token refresh failed: {e}"
            )))),
        }
    }
}

// ============================================================================
// TokenManager
// ============================================================================

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    NoToken,
    Acquiring,
    Valid,
    Refreshing,
    /// Refresh failed for a reason other than a rejected grant
    ExpiredTerminal,
}

struct DerivedCredentials {
    access_token: String,
    session: StorageSession,
}

#[derive(Default)]
struct Session {
    phase: SessionPhase,
    tokens: Option<Tokens>,
    /// The stored record has been read
    loaded: bool,
    /// Bound to the access token it was derived from
    storage: Option<DerivedCredentials>,
}

impl Session {
    fn transition(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "Session state change");
            self.phase = phase;
        }
    }
}

/// Owns the token record for one client instance
///
/// All state sits behind one async mutex, so at most one acquisition or
/// refresh is in flight; concurrent callers wait for its result.
pub struct TokenManager {
    oidc: OidcClient,
    sts: StsClient,
    repository: TokenRepository,
    prompt: Arc<dyn DevicePrompt>,
    session: Mutex<Session>,
}

impl TokenManager {
    pub fn new(oidc: OidcClient, sts: StsClient, repository: TokenRepository) -> Self {
        Self {
            oidc,
            sts,
            repository,
            prompt: Arc::new(BrowserPrompt),
            session: Mutex::new(Session::default()),
        }
    }

    /// Wires the manager from configuration with the keyring/plaintext store
    pub fn from_config(config: &Config) -> Self {
        let store = FallbackCredentialStore::from_config(&config.credentials);
        Self::new(
            OidcClient::new(OidcSettings::from_config(config)),
            StsClient::from_config(&config.storage),
            TokenRepository::new(Arc::new(store)),
        )
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn DevicePrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub async fn phase(&self) -> SessionPhase {
        self.session.lock().await.phase
    }

    /// Returns a valid token, loading, refreshing or acquiring as needed
    pub async fn ensure_token(&self) -> Result<Tokens, ClientError> {
        let mut session = self.session.lock().await;
        self.current_locked(&mut session).await
    }

    /// Forces a new acquisition regardless of any stored record
    pub async fn login(&self) -> Result<Tokens, ClientError> {
        let mut session = self.session.lock().await;
        session.loaded = true;
        self.acquire_locked(&mut session).await
    }

    /// Forgets the session and removes the stored record
    pub async fn logout(&self) {
        let mut session = self.session.lock().await;
        *session = Session {
            loaded: true,
            ..Session::default()
        };
        self.repository.clear();
    }

    /// The stored record, without touching the network
    pub fn status(&self) -> Result<Option<Tokens>, ClientError> {
        Ok(self.repository.load()?)
    }

    pub fn storage_backend(&self) -> &'static str {
        self.repository.backend_name()
    }

    /// Refreshes unless `stale` is no longer the current token
    ///
    /// A caller that saw a 401 with an old token gets the token another
    /// caller already refreshed, instead of a second refresh.
    pub async fn refresh_token(&self, stale: &str) -> Result<Tokens, ClientError> {
        let mut session = self.session.lock().await;
        if let (SessionPhase::Valid, Some(tokens)) = (session.phase, &session.tokens) {
            if tokens.access_token != stale {
                debug!("Token already refreshed by another caller");
                return Ok(tokens.clone());
            }
        }
        if session.tokens.is_none() {
            return self.current_locked(&mut session).await;
        }
        self.refresh_locked(&mut session).await
    }

    /// Subject identifier of the current access token
    pub async fn subject(&self) -> Result<String, ClientError> {
        let tokens = self.ensure_token().await?;
        jwt::subject(&tokens.access_token)
    }

    /// Temporary storage credentials for the current access token
    pub async fn storage_credentials(&self) -> Result<StorageSession, ClientError> {
        let mut session = self.session.lock().await;
        let tokens = self.current_locked(&mut session).await?;
        let now = self.oidc.clock().now();

        if let Some(derived) = &session.storage {
            let fresh = derived
                .session
                .credentials
                .expiry
                .map_or(true, |expiry| expiry > now);
            if derived.access_token == tokens.access_token && fresh {
                return Ok(derived.session.clone());
            }
        }

        let subject = jwt::subject(&tokens.access_token)?;
        let credentials = self
            .sts
            .assume_role_with_web_identity(&tokens.access_token, &subject)
            .await?;
        let storage = StorageSession {
            subject,
            credentials,
        };
        session.storage = Some(DerivedCredentials {
            access_token: tokens.access_token,
            session: storage.clone(),
        });
        Ok(storage)
    }

    async fn current_locked(&self, session: &mut Session) -> Result<Tokens, ClientError> {
        if !session.loaded {
            session.loaded = true;
            match self.repository.load() {
                Ok(Some(stored)) => {
                    debug!(expires_at = %stored.expires_at, "Loaded stored token");
                    session.tokens = Some(stored);
                    session.transition(SessionPhase::Valid);
                }
                Ok(None) => debug!("No stored token"),
                Err(e) => warn!(error = %e, "Ignoring unreadable stored token"),
            }
        }

        match (session.phase, session.tokens.clone()) {
            (SessionPhase::Valid, Some(tokens)) => {
                if tokens.is_expired_at(self.oidc.clock().now()) {
                    info!("Access token expired");
                    self.refresh_locked(session).await
                } else {
                    Ok(tokens)
                }
            }
            _ => self.acquire_locked(session).await,
        }
    }

    async fn refresh_locked(&self, session: &mut Session) -> Result<Tokens, ClientError> {
        let Some(refresh_token) = session
            .tokens
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
        else {
            info!("No refresh token held, acquiring a new token");
            return self.acquire_locked(session).await;
        };

        session.transition(SessionPhase::Refreshing);
        match self.oidc.refresh(&refresh_token).await {
            Ok(tokens) => self.install(session, tokens),
            Err(RefreshFailure::InvalidGrant) => {
                warn!("Refresh token rejected, acquiring a new token");
                session.tokens = None;
                session.storage = None;
                session.transition(SessionPhase::NoToken);
                self.acquire_locked(session).await
            }
            Err(RefreshFailure::Failed(e)) => {
                session.transition(SessionPhase::ExpiredTerminal);
                Err(e)
            }
        }
    }

    async fn acquire_locked(&self, session: &mut Session) -> Result<Tokens, ClientError> {
        session.transition(SessionPhase::Acquiring);

        let result = if self.oidc.uses_client_credentials() {
            self.oidc.client_credentials().await
        } else {
            self.device_flow().await
        };

        match result {
            Ok(tokens) => self.install(session, tokens),
            Err(e) => {
                session.tokens = None;
                session.storage = None;
                session.transition(SessionPhase::NoToken);
                Err(e)
            }
        }
    }

    async fn device_flow(&self) -> Result<Tokens, ClientError> {
        let authorization = self.oidc.request_device_authorization().await?;
        self.prompt.present(&authorization);
        self.oidc.wait_for_device_token(&authorization).await
    }

    /// Persists, then makes `tokens` current and drops derived credentials
    fn install(&self, session: &mut Session, tokens: Tokens) -> Result<Tokens, ClientError> {
        if let Err(e) = self.repository.save(&tokens) {
            session.transition(SessionPhase::NoToken);
            return Err(e.into());
        }
        session.tokens = Some(tokens.clone());
        session.storage = None;
        session.transition(SessionPhase::Valid);
        debug!(expires_at = %tokens.expires_at, interactive = tokens.is_interactive(), "Token installed");
        Ok(tokens)
    }
}

#[async_trait::async_trait]
impl TokenSource for TokenManager {
    async fn access_token(&self) -> Result<String, ClientError> {
        Ok(self.ensure_token().await?.access_token)
    }

    async fn refresh(&self, stale: &str) -> Result<String, ClientError> {
        Ok(self.refresh_token(stale).await?.access_token)
    }
}

#[async_trait::async_trait]
impl StorageSessionSource for TokenManager {
    async fn storage_session(&self) -> Result<StorageSession, ClientError> {
        self.storage_credentials().await
    }
}
