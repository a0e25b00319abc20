//! JWT token creation and validation.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value;
use thiserror::Error;

use crate::config::Settings;

use super::types::{Claims, ValidatedToken};

#[derive(Debug, Error)]
pub enum TokenError {
    /// Any decode failure: expired, malformed, bad signature, wrong algorithm.
    #[error("Could not validate credentials")]
    Unauthorized,

    #[error("Failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Signs and verifies session tokens with one static secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    default_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, algorithm: Algorithm, default_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            default_ttl,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.secret_key,
            settings.algorithm,
            Duration::minutes(settings.access_token_expire_minutes),
        )
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Sign a copy of `claims` with `exp = now + ttl` merged in.
    pub fn issue(&self, claims: &Claims, ttl: Option<Duration>) -> Result<String, TokenError> {
        let expire = Utc::now() + ttl.unwrap_or(self.default_ttl);

        let mut to_encode = claims.clone();
        to_encode.insert("exp".to_string(), Value::from(expire.timestamp()));

        encode(&Header::new(self.algorithm), &to_encode, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    /// Token for a user id, with the default lifetime.
    pub fn issue_for_subject(&self, subject: &str) -> Result<String, TokenError> {
        let mut claims = Claims::new();
        claims.insert("sub".to_string(), Value::from(subject));
        self.issue(&claims, None)
    }

    /// Check signature and expiry in one step.
    pub fn verify(&self, token: &str) -> Result<ValidatedToken, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_aud = false;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| TokenError::Unauthorized)?;

        ValidatedToken::from_claims(token_data.claims).ok_or(TokenError::Unauthorized)
    }
}
