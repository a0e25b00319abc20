//! Authentication HTTP handlers.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    Json,
};
use shared_types::{AuthUrlResponse, LogoutResponse, TokenValidationResponse};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

use super::middleware::{
    build_auth_cookie, build_logout_cookie, build_state_clearing_cookie, build_state_cookie,
    cookie_value, AuthClaims, OAUTH_STATE_COOKIE,
};
use super::types::CallbackParams;

/// Start Google OAuth login flow.
///
/// Returns a URL that the frontend should redirect the user to, and pins the
/// login state to this browser with a cookie only the callback receives.
pub async fn google_login(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let redirect_uri = state.settings.google_redirect_uri();

    let request = state
        .auth
        .begin_login(&redirect_uri)
        .await
        .map_err(ApiError::AuthorizationUrl)?;

    let cookie = build_state_cookie(&state.settings, &request.state);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(AuthUrlResponse {
            authorization_url: request.url,
        }),
    ))
}

/// Handle Google OAuth callback.
///
/// A browser is on the other end of this request, so every outcome is a
/// redirect: to the dashboard with the session cookie on success, to the
/// login page with a generic error otherwise. The state cookie is cleared
/// either way.
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let settings = &state.settings;
    let browser_state = cookie_value(&headers, OAUTH_STATE_COOKIE);
    let clear_state = build_state_clearing_cookie(settings);

    match state
        .auth
        .complete_login(&params, browser_state.as_deref())
        .await
    {
        Ok(outcome) => {
            let cookie = build_auth_cookie(settings, &outcome.token);
            tracing::info!(
                "User {} successfully authenticated via Google OAuth",
                outcome.user.email
            );
            (
                AppendHeaders([(header::SET_COOKIE, clear_state), (header::SET_COOKIE, cookie)]),
                Redirect::temporary(&settings.frontend_success_url()),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Auth callback error: {}", e);
            (
                [(header::SET_COOKIE, clear_state)],
                Redirect::temporary(&settings.frontend_error_url()),
            )
                .into_response()
        }
    }
}

/// Report whether the presented token is still good.
pub async fn validate_token(AuthClaims(token): AuthClaims) -> Json<TokenValidationResponse> {
    Json(TokenValidationResponse {
        valid: true,
        user_id: token.subject,
        expires_at: token.expires_at,
    })
}

/// Logout - clear auth cookie. Succeeds with or without a token.
pub async fn logout(
    State(state): State<AppState>,
    claims: Option<AuthClaims>,
) -> impl IntoResponse {
    state.auth.logout(claims.as_ref().map(|c| &c.0));

    let cookie = build_logout_cookie(&state.settings);
    (
        [(header::SET_COOKIE, cookie)],
        Json(LogoutResponse {
            message: "Successfully logged out".to_string(),
        }),
    )
}
