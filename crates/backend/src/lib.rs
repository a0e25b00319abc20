//! Google OAuth login backend.
//!
//! Exchanges Google authorization codes for a verified profile, keeps one
//! row per email in `users`, and hands the browser a signed session token in
//! an httponly cookie. `/users/me` is the only protected resource.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod schema;
pub mod test_util;

use auth::AuthService;
use config::Settings;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(settings: Settings, auth: AuthService) -> Self {
        Self {
            settings: Arc::new(settings),
            auth: Arc::new(auth),
        }
    }
}

/// Routes under the `/api/v1` prefix.
fn api_routes() -> Router<AppState> {
    Router::new()
        // Auth routes
        .route("/auth/login/google", get(auth::google_login))
        .route("/auth/callback/google", get(auth::google_callback))
        .route("/auth/validate", get(auth::validate_token))
        .route("/auth/logout", post(auth::logout))
        // User routes
        .route("/users/me", get(handlers::get_current_user))
}

pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.settings.cors_allowed_origins);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build CORS layer based on environment configuration.
///
/// With no allowed origins configured, falls back to permissive CORS
/// (for development only).
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!(
            "CORS_ALLOWED_ORIGINS not set, using permissive CORS (not recommended for production)"
        );
        return CorsLayer::permissive();
    }

    tracing::info!("CORS configured for origins: {:?}", origins);
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
