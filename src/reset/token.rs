//! Self-revoking password reset tokens.
//!
//! A token is an HS256 JWT signed with `global_secret || password_hash`. There is no
//! token table: writing a new password hash changes the signing key, so every token
//! issued against the old hash stops verifying.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const RESET_TOKEN_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetClaims {
    pub id: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Not a JWT, or the claims do not deserialize.
    Malformed(String),
    /// Signed with a different key: tampered, or the password changed since issuance.
    BadSignature,
    Expired,
    /// Valid signature, but issued for another account than the one presented.
    AccountMismatch,
    Signing(String),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed(msg) => write!(f, "malformed token: {msg}"),
            TokenError::BadSignature => write!(f, "signature mismatch"),
            TokenError::Expired => write!(f, "token expired"),
            TokenError::AccountMismatch => write!(f, "token issued for another account"),
            TokenError::Signing(msg) => write!(f, "signing failed: {msg}"),
        }
    }
}

/// Per-user signing key: the global secret followed by the user's current password hash.
pub fn derive_secret(global_secret: &str, password_hash: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(global_secret.len() + password_hash.len());
    key.extend_from_slice(global_secret.as_bytes());
    key.extend_from_slice(password_hash.as_bytes());
    key
}

pub fn issue(
    global_secret: &str,
    user_id: Uuid,
    email: &str,
    password_hash: &str,
) -> Result<String, TokenError> {
    issue_at(global_secret, user_id, email, password_hash, Utc::now())
}

pub fn issue_at(
    global_secret: &str,
    user_id: Uuid,
    email: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    let claims = ResetClaims {
        id: user_id,
        email: email.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(RESET_TOKEN_TTL_MINUTES)).timestamp(),
    };
    let key = derive_secret(global_secret, password_hash);

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&key),
    )
    .map_err(|e| TokenError::Signing(e.to_string()))
}

pub fn verify(
    token: &str,
    global_secret: &str,
    user_id: Uuid,
    email: &str,
    current_password_hash: &str,
) -> Result<ResetClaims, TokenError> {
    verify_at(
        token,
        global_secret,
        user_id,
        email,
        current_password_hash,
        Utc::now(),
    )
}

/// Checks signature against the key derived from `current_password_hash`, then expiry
/// against `now`, then that the claims name the expected account.
pub fn verify_at(
    token: &str,
    global_secret: &str,
    user_id: Uuid,
    email: &str,
    current_password_hash: &str,
    now: DateTime<Utc>,
) -> Result<ResetClaims, TokenError> {
    let key = derive_secret(global_secret, current_password_hash);

    // Expiry is checked below against the caller's clock.
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.leeway = 0;

    let claims = decode::<ResetClaims>(token, &DecodingKey::from_secret(&key), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed(e.to_string()),
        })?;

    if claims.exp <= now.timestamp() {
        return Err(TokenError::Expired);
    }

    if claims.id != user_id || claims.email != email {
        return Err(TokenError::AccountMismatch);
    }

    Ok(claims)
}
