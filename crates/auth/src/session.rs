//! Session and user types

use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::AuthError;

/// Authenticated user as returned by the auth server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Credential bundle issued by the auth server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    /// Unix timestamp (seconds) at which `access_token` stops being valid
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub token_type: String,
    pub user: User,
}

impl Session {
    /// Fill in `expires_at` when the server left it out.
    ///
    /// The `exp` claim of the access token wins over `expires_in`.
    pub(crate) fn normalized(mut self) -> Self {
        if self.expires_at.is_none() {
            let from_claims = decode_claims(&self.access_token)
                .ok()
                .and_then(|claims| claims.exp);
            self.expires_at = Some(from_claims.unwrap_or_else(|| now() + self.expires_in));
        }
        self
    }

    /// Whether the access token expires within `margin_secs` from now
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now() + margin_secs >= expires_at,
            None => false,
        }
    }

    /// Whether the access token has already expired
    pub fn is_expired(&self) -> bool {
        self.expires_within(0)
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

/// Claims of an access token that the client cares about
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Read the claims of an access token without verifying its signature.
///
/// Only the server can verify tokens; the client reads them for expiry
/// and identity hints.
pub fn decode_claims(token: &str) -> Result<AccessTokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<AccessTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            debug!("Access token claims could not be read: {}", e);
            AuthError::InvalidToken(e.to_string())
        })
}

fn now() -> i64 {
    Utc::now().timestamp()
}
