//! Auth-related types.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Free-form claim set carried by a session token.
pub type Claims = Map<String, Value>;

/// Verified identity returned by the provider after a code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub email: String,
    pub display_name: Option<String>,
}

/// Consent URL plus the state it carries.
///
/// The state is also handed to the browser in a cookie so the callback can
/// prove it comes from the same browser that started the login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Query string Google sends to the callback endpoint.
///
/// Every field is optional so that a malformed callback still reaches the
/// handler and ends in the error redirect instead of a 400.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user declines consent
    pub error: Option<String>,
}

/// Claims of a token that passed signature and expiry checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedToken {
    /// `sub` claim, if the token carries one
    pub subject: Option<String>,
    /// `exp` claim as a unix timestamp
    pub expires_at: i64,
    pub claims: Claims,
}

impl ValidatedToken {
    pub fn from_claims(claims: Claims) -> Option<Self> {
        let expires_at = claims.get("exp")?.as_i64()?;
        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Self {
            subject,
            expires_at,
            claims,
        })
    }
}
