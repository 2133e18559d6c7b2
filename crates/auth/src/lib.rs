//! Bearer token verification.
//!
//! The rest of the backend never looks at raw tokens or claims: a token is
//! turned into an [`Identity`] once, at the auth boundary, and that value is
//! threaded explicitly into request handlers and connections.

use chrono::{Duration, Utc};
use chatwire_config::AuthConfig;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("token is expired")]
    ExpiredToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("failed to issue token: {0}")]
    TokenCreation(String),
}

/// Verified caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub role_id: i64,
    pub company_id: Option<i64>,
    pub department_id: Option<i64>,
}

impl Identity {
    pub fn new(user_id: i64, role_id: i64) -> Self {
        Self {
            user_id,
            role_id,
            company_id: None,
            department_id: None,
        }
    }

    pub fn with_tenant(mut self, company_id: Option<i64>, department_id: Option<i64>) -> Self {
        self.company_id = company_id;
        self.department_id = department_id;
        self
    }
}

/// Claims carried by access tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub user_id: i64,
    pub role_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<i64>,
    pub iat: i64,
    pub exp: i64,
}

impl From<&Claims> for Identity {
    fn from(claims: &Claims) -> Self {
        Identity::new(claims.user_id, claims.role_id)
            .with_tenant(claims.company_id, claims.department_id)
    }
}

/// Turns a bearer token into an [`Identity`].
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// HS256 token verifier and issuer.
#[derive(Clone)]
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
}

impl JwtAuthenticator {
    pub fn new(secret: &str, token_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        // chrono durations are millisecond-bounded
        let max_seconds = (i64::MAX / 1_000) as u64;
        let ttl_seconds = config.token_ttl_seconds.min(max_seconds) as i64;
        Self::new(&config.jwt_secret, Duration::seconds(ttl_seconds))
    }

    /// Issue a token for `identity` that expires after the configured ttl.
    pub fn issue(&self, identity: &Identity) -> Result<String, AuthError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.token_ttl)
            .ok_or_else(|| AuthError::TokenCreation("token ttl overflows".to_string()))?;
        self.issue_with_expiry(identity, now.timestamp(), expires_at.timestamp())
    }

    /// Issue a token with explicit `iat`/`exp` timestamps (seconds since epoch).
    pub fn issue_with_expiry(
        &self,
        identity: &Identity,
        issued_at: i64,
        expires_at: i64,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            user_id: identity.user_id,
            role_id: identity.role_id,
            company_id: identity.company_id,
            department_id: identity.department_id,
            iat: issued_at,
            exp: expires_at,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AuthError::TokenCreation(err.to_string()))
    }

    pub fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken(err.to_string()),
            }
        })?;

        if data.claims.user_id <= 0 {
            return Err(AuthError::InvalidToken("user_id must be positive".to_string()));
        }

        Ok(data.claims)
    }
}

impl IdentityVerifier for JwtAuthenticator {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = self.decode_claims(token)?;
        let identity = Identity::from(&claims);
        debug!(user_id = identity.user_id, role_id = identity.role_id, "token verified");
        Ok(identity)
    }
}

/// Strip the `Bearer ` scheme from an `Authorization` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
