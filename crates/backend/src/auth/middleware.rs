//! Token extraction and session cookies.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use cookie::{time::Duration as CookieDuration, Cookie, SameSite};

use crate::config::{Settings, GOOGLE_CALLBACK_PATH};
use crate::error::ApiError;
use crate::AppState;

use super::google::STATE_TTL_MINUTES;
use super::types::ValidatedToken;

/// Name of the session cookie set on successful login.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Name of the cookie binding a pending login to the browser that began it.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// A request whose bearer token (or session cookie) verified.
///
/// Rejects with `401` otherwise. Wrap in `Option` for endpoints where a token
/// is welcome but not required.
#[derive(Debug, Clone)]
pub struct AuthClaims(pub ValidatedToken);

#[async_trait]
impl FromRequestParts<AppState> for AuthClaims {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let validated = state.auth.validate(&token)?;
        Ok(AuthClaims(validated))
    }
}

/// Authorization header first, then the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    extract_token_from_header(headers)
        .or_else(|| cookie_value(headers, ACCESS_TOKEN_COOKIE))
}

/// Non-empty value of the named request cookie.
pub fn cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| Cookie::parse(pair.trim()).ok())
        .find(|cookie| cookie.name() == cookie_name && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_string())
}

/// Auth scheme names are case-insensitive.
fn extract_token_from_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn base_cookie(
    settings: &Settings,
    name: &'static str,
    path: &'static str,
    value: String,
) -> cookie::CookieBuilder<'static> {
    let mut builder = Cookie::build((name, value))
        .path(path)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.is_production());

    if let Some(domain) = &settings.cookie_domain {
        builder = builder.domain(domain.clone());
    }
    builder
}

/// `Set-Cookie` value carrying a freshly issued token.
pub fn build_auth_cookie(settings: &Settings, token: &str) -> String {
    base_cookie(settings, ACCESS_TOKEN_COOKIE, "/", token.to_string())
        .max_age(CookieDuration::seconds(settings.access_token_max_age_secs()))
        .build()
        .to_string()
}

/// `Set-Cookie` value that makes the browser drop the session cookie.
pub fn build_logout_cookie(settings: &Settings) -> String {
    base_cookie(settings, ACCESS_TOKEN_COOKIE, "/", String::new())
        .max_age(CookieDuration::ZERO)
        .build()
        .to_string()
}

/// `Set-Cookie` value remembering the login state, sent only to the callback.
pub fn build_state_cookie(settings: &Settings, state: &str) -> String {
    base_cookie(settings, OAUTH_STATE_COOKIE, GOOGLE_CALLBACK_PATH, state.to_string())
        .max_age(CookieDuration::minutes(STATE_TTL_MINUTES))
        .build()
        .to_string()
}

/// `Set-Cookie` value that drops the login state once the callback ran.
pub fn build_state_clearing_cookie(settings: &Settings) -> String {
    base_cookie(settings, OAUTH_STATE_COOKIE, GOOGLE_CALLBACK_PATH, String::new())
        .max_age(CookieDuration::ZERO)
        .build()
        .to_string()
}
