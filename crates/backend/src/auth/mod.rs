//! Authentication module for JWT-based auth with Google OAuth login.
//!
//! This module provides:
//! - JWT token creation and validation
//! - Google OAuth flow for user login
//! - The `AuthClaims` extractor for protecting routes
//! - Session and login-state cookie helpers

pub mod google;
mod handlers;
pub mod jwt;
pub mod middleware;
pub mod service;
pub mod types;

pub use google::{GoogleClient, IdentityProvider, OAuthError};
pub use handlers::{google_callback, google_login, logout, validate_token};
pub use jwt::{TokenError, TokenService};
pub use middleware::{
    build_auth_cookie, build_logout_cookie, AuthClaims, ACCESS_TOKEN_COOKIE, OAUTH_STATE_COOKIE,
};
pub use service::AuthService;
