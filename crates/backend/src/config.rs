//! Process-wide settings.
//!
//! Built once in `main` from the environment (after `dotenvy` has loaded a
//! `.env` file, if any) and handed to every component that needs it.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` | required (`memory://` for an in-process store) |
//! | `SECRET_KEY` | required |
//! | `ALGORITHM` | `HS256` |
//! | `ACCESS_TOKEN_EXPIRE_MINUTES` | `30` |
//! | `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` | required |
//! | `GOOGLE_AUTH_URL` / `GOOGLE_TOKEN_URL` / `GOOGLE_USERINFO_URL` | Google endpoints |
//! | `BACKEND_URL` | `http://127.0.0.1:8000` |
//! | `FRONTEND_URL` | `http://localhost:5173` |
//! | `ENVIRONMENT` | `development` |
//! | `COOKIE_DOMAIN` | unset |
//! | `HOST` / `PORT` | `0.0.0.0` / `8000` |
//! | `CORS_ALLOWED_ORIGINS` | unset (permissive) |

use std::fmt;

use jsonwebtoken::Algorithm;
use thiserror::Error;

pub const DEFAULT_GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Path the provider redirects back to, relative to `BACKEND_URL`.
pub const GOOGLE_CALLBACK_PATH: &str = "/api/v1/auth/callback/google";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone)]
pub struct Settings {
    pub database_url: String,
    pub secret_key: String,
    pub algorithm: Algorithm,
    pub access_token_expire_minutes: i64,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_auth_url: String,
    pub google_token_url: String,
    pub google_userinfo_url: String,
    pub backend_url: String,
    pub frontend_url: String,
    pub environment: String,
    pub cookie_domain: Option<String>,
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let algorithm = match get("ALGORITHM") {
            Some(raw) => parse_algorithm(&raw)?,
            None => Algorithm::HS256,
        };

        let access_token_expire_minutes = match get("ACCESS_TOKEN_EXPIRE_MINUTES") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|m| *m > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "ACCESS_TOKEN_EXPIRE_MINUTES",
                    reason: format!("expected a positive integer, got {raw:?}"),
                })?,
            None => 30,
        };

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                reason: format!("expected a port number, got {raw:?}"),
            })?,
            None => 8000,
        };

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            secret_key: required("SECRET_KEY")?,
            algorithm,
            access_token_expire_minutes,
            google_client_id: required("GOOGLE_CLIENT_ID")?,
            google_client_secret: required("GOOGLE_CLIENT_SECRET")?,
            google_auth_url: get("GOOGLE_AUTH_URL")
                .unwrap_or_else(|| DEFAULT_GOOGLE_AUTH_URL.to_string()),
            google_token_url: get("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|| DEFAULT_GOOGLE_TOKEN_URL.to_string()),
            google_userinfo_url: get("GOOGLE_USERINFO_URL")
                .unwrap_or_else(|| DEFAULT_GOOGLE_USERINFO_URL.to_string()),
            backend_url: trim_url(get("BACKEND_URL"), "http://127.0.0.1:8000"),
            frontend_url: trim_url(get("FRONTEND_URL"), "http://localhost:5173"),
            environment: get("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            cookie_domain: get("COOKIE_DOMAIN"),
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            cors_allowed_origins,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Absolute URL Google redirects to after consent.
    pub fn google_redirect_uri(&self) -> String {
        format!("{}{}", self.backend_url, GOOGLE_CALLBACK_PATH)
    }

    /// Where the browser lands after a successful login.
    pub fn frontend_success_url(&self) -> String {
        format!("{}/dashboard", self.frontend_url)
    }

    /// Where the browser lands after any failed login.
    pub fn frontend_error_url(&self) -> String {
        format!("{}/login?error=authentication_failed", self.frontend_url)
    }

    pub fn access_token_max_age_secs(&self) -> i64 {
        self.access_token_expire_minutes * 60
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("database_url", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("access_token_expire_minutes", &self.access_token_expire_minutes)
            .field("google_client_id", &self.google_client_id)
            .field("google_client_secret", &"<redacted>")
            .field("backend_url", &self.backend_url)
            .field("frontend_url", &self.frontend_url)
            .field("environment", &self.environment)
            .field("cookie_domain", &self.cookie_domain)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// Only HMAC algorithms make sense with a shared secret.
fn parse_algorithm(raw: &str) -> Result<Algorithm, ConfigError> {
    let algorithm: Algorithm = raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name: "ALGORITHM",
        reason: format!("unknown algorithm {raw:?}"),
    })?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => Err(ConfigError::Invalid {
            name: "ALGORITHM",
            reason: format!("{other:?} needs a key pair; use HS256, HS384 or HS512"),
        }),
    }
}

fn trim_url(value: Option<String>, default: &str) -> String {
    value
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}
