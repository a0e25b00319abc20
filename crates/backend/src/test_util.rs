//! Fixtures shared by unit and integration tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use jsonwebtoken::Algorithm;

use crate::auth::google::{IdentityProvider, OAuthError};
use crate::auth::jwt::TokenService;
use crate::auth::service::AuthService;
use crate::auth::types::{AuthorizationRequest, CallbackParams, Profile};
use crate::config::{
    Settings, DEFAULT_GOOGLE_AUTH_URL, DEFAULT_GOOGLE_TOKEN_URL, DEFAULT_GOOGLE_USERINFO_URL,
};
use crate::repository::InMemoryUserStore;
use crate::AppState;

pub const TEST_SECRET: &str = "test-secret-key-for-testing-only";

/// The only state [`FakeIdentityProvider`] accepts.
pub const FAKE_STATE: &str = "fake-state";

pub fn test_settings() -> Settings {
    Settings {
        database_url: "memory://".to_string(),
        secret_key: TEST_SECRET.to_string(),
        algorithm: Algorithm::HS256,
        access_token_expire_minutes: 30,
        google_client_id: "test-client-id".to_string(),
        google_client_secret: "test-client-secret".to_string(),
        google_auth_url: DEFAULT_GOOGLE_AUTH_URL.to_string(),
        google_token_url: DEFAULT_GOOGLE_TOKEN_URL.to_string(),
        google_userinfo_url: DEFAULT_GOOGLE_USERINFO_URL.to_string(),
        backend_url: "http://127.0.0.1:8000".to_string(),
        frontend_url: "http://localhost:5173".to_string(),
        environment: "development".to_string(),
        cookie_domain: None,
        host: "127.0.0.1".to_string(),
        port: 8000,
        cors_allowed_origins: Vec::new(),
    }
}

pub fn test_token_service() -> TokenService {
    TokenService::new(TEST_SECRET, Algorithm::HS256, Duration::minutes(30))
}

/// Provider that skips the network: accepts [`FAKE_STATE`] and hands back a
/// fixed profile, or fails every exchange. Callback checks happen in the same
/// order as in `GoogleClient`.
pub struct FakeIdentityProvider {
    profile: Option<Profile>,
}

impl FakeIdentityProvider {
    pub fn returning(email: &str, display_name: Option<&str>) -> Self {
        Self {
            profile: Some(Profile {
                email: email.to_string(),
                display_name: display_name.map(str::to_string),
            }),
        }
    }

    pub fn failing() -> Self {
        Self { profile: None }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn authorization_url(
        &self,
        redirect_uri: &str,
    ) -> Result<AuthorizationRequest, OAuthError> {
        if self.profile.is_none() {
            return Err(OAuthError::NotConfigured);
        }
        Ok(AuthorizationRequest {
            url: format!(
                "{}?redirect_uri={}&state={}",
                DEFAULT_GOOGLE_AUTH_URL,
                urlencoding::encode(redirect_uri),
                FAKE_STATE
            ),
            state: FAKE_STATE.to_string(),
        })
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
        if callback.code.is_none() {
            return Err(OAuthError::MissingParameter("code"));
        }
        if state != FAKE_STATE {
            return Err(OAuthError::StateMismatch);
        }
        self.profile
            .clone()
            .ok_or_else(|| OAuthError::TokenExchange("400 Bad Request".to_string()))
    }
}

/// App state over an in-memory store and the given provider.
pub fn test_state<P>(settings: Settings, provider: P, users: Arc<InMemoryUserStore>) -> AppState
where
    P: IdentityProvider + 'static,
{
    let tokens = TokenService::from_settings(&settings);
    let auth = AuthService::new(Arc::new(provider), users, tokens);
    AppState::new(settings, auth)
}
