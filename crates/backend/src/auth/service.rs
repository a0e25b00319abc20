//! Login flow: provider exchange, user upsert, token issuance.

use std::sync::Arc;

use shared_types::User;
use thiserror::Error;
use uuid::Uuid;

use crate::repository::{StoreError, UserStore};

use super::google::{IdentityProvider, OAuthError};
use super::jwt::{TokenError, TokenService};
use super::types::{AuthorizationRequest, CallbackParams, ValidatedToken};

/// Why a callback did not end in [`LoginOutcome`].
///
/// The HTTP layer turns every variant into the same browser redirect.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error(transparent)]
    OAuth(#[from] OAuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Failure looking up the user behind a verified token.
#[derive(Debug, Error)]
pub enum CurrentUserError {
    /// Subject is missing or not a user id
    #[error("Could not validate credentials")]
    Unauthorized,
    #[error("User not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub token: String,
}

pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserStore>,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        users: Arc<dyn UserStore>,
        tokens: TokenService,
    ) -> Self {
        Self {
            provider,
            users,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub async fn begin_login(
        &self,
        redirect_uri: &str,
    ) -> Result<AuthorizationRequest, OAuthError> {
        self.provider.authorization_url(redirect_uri).await
    }

    /// Finish a login. `browser_state` is the state the browser was given by
    /// [`AuthService::begin_login`]; a callback carrying any other state is
    /// rejected before the provider is contacted.
    pub async fn complete_login(
        &self,
        callback: &CallbackParams,
        browser_state: Option<&str>,
    ) -> Result<LoginOutcome, LoginError> {
        if let Some(state) = callback.state.as_deref() {
            if browser_state != Some(state) {
                return Err(OAuthError::StateMismatch.into());
            }
        }

        let profile = self.provider.exchange_and_fetch_profile(callback).await?;

        let user = self
            .users
            .find_or_create_by_email(&profile.email, profile.display_name.as_deref())
            .await?;

        let token = self.tokens.issue_for_subject(&user.id.to_string())?;

        Ok(LoginOutcome { user, token })
    }

    pub fn validate(&self, token: &str) -> Result<ValidatedToken, TokenError> {
        self.tokens.verify(token)
    }

    /// Sessions live only in the client, so there is nothing to tear down.
    pub fn logout(&self, token: Option<&ValidatedToken>) {
        if let Some(subject) = token.and_then(|t| t.subject.as_deref()) {
            tracing::info!("User {} successfully logged out", subject);
        }
    }

    /// User named by a verified token's subject.
    pub async fn current_user(&self, token: &ValidatedToken) -> Result<User, CurrentUserError> {
        let user_id = token
            .subject
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or(CurrentUserError::Unauthorized)?;

        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(CurrentUserError::NotFound)
    }
}
