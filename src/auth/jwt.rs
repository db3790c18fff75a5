//! JWT token generation and validation.
//!
//! Tokens are HS256-signed bearer tokens whose subject is the username.
//! Expired or malformed tokens fail verification; callers treat any failure
//! as unauthenticated.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::JwtConfig;

const ISSUER: &str = "coedit-backend";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the username.
    pub sub: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (Unix timestamp).
    pub iat: u64,
    /// Expiration time (Unix timestamp).
    pub exp: u64,
}

/// Create a signed token for a user.
pub fn create_token(cfg: &JwtConfig, username: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let claims = Claims {
        sub: username.to_string(),
        iss: ISSUER.to_string(),
        iat: now,
        exp: now + cfg.expiration.as_secs(),
    };

    let key = EncodingKey::from_secret(cfg.secret.as_bytes());
    encode(&Header::default(), &claims, &key)
}

/// Verify a token and return its claims. Expiration is checked.
pub fn verify_token(cfg: &JwtConfig, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(cfg.secret.as_bytes());
    let validation = Validation::default();
    let data = decode::<Claims>(token, &key, &validation)?;
    Ok(data.claims)
}
