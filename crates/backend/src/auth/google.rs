//! Google OAuth2 / OpenID Connect client.
//!
//! Builds the consent URL, remembers the anti-forgery state it handed out,
//! and on callback trades the authorization code for the user's profile.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::Settings;

use super::types::{AuthorizationRequest, CallbackParams, Profile};

const SCOPES: &str = "openid email profile";
/// How long a login may take between consent URL and callback.
pub const STATE_TTL_MINUTES: i64 = 10;
const MAX_PENDING_STATES: usize = 10_000;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Google OAuth client not configured")]
    NotConfigured,

    #[error("provider returned error: {0}")]
    ProviderDenied(String),

    #[error("callback is missing the {0} parameter")]
    MissingParameter(&'static str),

    #[error("state does not match any pending login")]
    StateMismatch,

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("failed to fetch user info: {0}")]
    UserInfo(String),

    #[error("provider profile has no email")]
    MissingEmail,

    #[error("HTTP error talking to provider: {0}")]
    Http(#[from] reqwest::Error),
}

/// Remote identity provider as seen by the login flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent URL carrying a fresh state value that is remembered for
    /// [`IdentityProvider::exchange_and_fetch_profile`].
    async fn authorization_url(
        &self,
        redirect_uri: &str,
    ) -> Result<AuthorizationRequest, OAuthError>;

    /// Verify and consume the callback state, exchange the code, and return
    /// the verified profile.
    async fn exchange_and_fetch_profile(
        &self,
        callback: &CallbackParams,
    ) -> Result<Profile, OAuthError>;
}

#[derive(Debug, Clone)]
struct PendingState {
    redirect_uri: String,
    expires_at: DateTime<Utc>,
    seq: u64,
}

/// States issued by `authorization_url` that have not come back yet.
///
/// Each state validates at most once and expires after ten minutes. At most
/// `max_entries` are kept; the oldest is evicted to make room.
#[derive(Debug)]
pub struct PendingStates {
    states: Mutex<HashMap<String, PendingState>>,
    ttl: Duration,
    max_entries: usize,
    next_seq: AtomicU64,
}

impl Default for PendingStates {
    fn default() -> Self {
        Self::with_limits(Duration::minutes(STATE_TTL_MINUTES), MAX_PENDING_STATES)
    }
}

impl PendingStates {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_limits(ttl, MAX_PENDING_STATES)
    }

    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Remember `state` along with the redirect URI it was issued for.
    pub async fn insert(&self, state: String, redirect_uri: String) {
        let now = Utc::now();
        let mut guard = self.states.lock().await;
        guard.retain(|_, pending| pending.expires_at > now);

        while guard.len() >= self.max_entries {
            let oldest = guard
                .iter()
                .min_by_key(|(_, pending)| pending.seq)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    tracing::warn!("Pending OAuth states at capacity, evicting oldest");
                    guard.remove(&key);
                }
                None => break,
            }
        }

        guard.insert(
            state,
            PendingState {
                redirect_uri,
                expires_at: now + self.ttl,
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            },
        );
    }

    /// Remove `state` and return its redirect URI if it was live.
    pub async fn consume(&self, state: &str) -> Option<String> {
        let pending = self.states.lock().await.remove(state)?;
        (pending.expires_at > Utc::now()).then_some(pending.redirect_uri)
    }

    pub async fn len(&self) -> usize {
        self.states.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.lock().await.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: Option<String>,
    name: Option<String>,
}

/// [`IdentityProvider`] backed by Google's OAuth endpoints.
pub struct GoogleClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
    pending: PendingStates,
}

impl GoogleClient {
    pub fn new(settings: &Settings) -> Self {
        Self::with_http(settings, reqwest::Client::new())
    }

    pub fn with_http(settings: &Settings, http: reqwest::Client) -> Self {
        Self {
            http,
            client_id: settings.google_client_id.clone(),
            client_secret: settings.google_client_secret.clone(),
            auth_url: settings.google_auth_url.clone(),
            token_url: settings.google_token_url.clone(),
            userinfo_url: settings.google_userinfo_url.clone(),
            pending: PendingStates::default(),
        }
    }

    pub fn pending_states(&self) -> &PendingStates {
        &self.pending
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, OAuthError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Token exchange failed: {} - {}", status, body);
            return Err(OAuthError::TokenExchange(status.to_string()));
        }

        let tokens: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::TokenExchange(format!("invalid token response: {e}")))?;

        Ok(tokens.access_token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, OAuthError> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OAuthError::UserInfo(response.status().to_string()));
        }

        let info: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| OAuthError::UserInfo(format!("invalid user info response: {e}")))?;

        let email = info
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or(OAuthError::MissingEmail)?;

        Ok(Profile {
            email,
            display_name: info.name,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleClient {
    async fn authorization_url(
        &self,
        redirect_uri: &str,
    ) -> Result<AuthorizationRequest, OAuthError> {
        if self.client_id.is_empty() {
            return Err(OAuthError::NotConfigured);
        }

        let state = uuid::Uuid::new_v4().simple().to_string();
        self.pending
            .insert(state.clone(), redirect_uri.to_string())
            .await;

        let url = format!(
            "{}?\
             response_type=code&\
             client_id={}&\
             redirect_uri={}&\
             scope={}&\
             state={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPES),
            state
        );

        Ok(AuthorizationRequest { url, state })
    }

    async fn exchange_and_fetch_profile(
        &self,
        callback: &CallbackParams,
    ) -> Result<Profile, OAuthError> {
        if let Some(error) = &callback.error {
            return Err(OAuthError::ProviderDenied(error.clone()));
        }
        let state = callback
            .state
            .as_deref()
            .ok_or(OAuthError::MissingParameter("state"))?;
        let code = callback
            .code
            .as_deref()
            .ok_or(OAuthError::MissingParameter("code"))?;

        let redirect_uri = self
            .pending
            .consume(state)
            .await
            .ok_or(OAuthError::StateMismatch)?;

        let access_token = self.exchange_code(code, &redirect_uri).await?;
        self.fetch_profile(&access_token).await
    }
}
