use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;

pub mod password;

/// Claims for access tokens (short-lived, stateless, never persisted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Principal id
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
}

/// Claims for refresh tokens. `jti` is the id of the persisted
/// refresh-token record; the token is valid only while that record exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub jti: Uuid,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("token generation error: {0}")]
    Generation(String),
}

/// Injected verifier for both token kinds. Constructed once at process start
/// and handed to the pipeline and handlers; HS256 only.
#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_days: i64,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_ttl_secs: config.access_token_ttl_secs,
            refresh_ttl_days: config.refresh_token_ttl_days,
        }
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: user_id,
            exp: (now + Duration::seconds(self.access_ttl_secs)).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| TokenError::Generation(e.to_string()))
    }

    pub fn issue_refresh_token(&self, user_id: Uuid, record_id: Uuid) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: user_id,
            jti: record_id,
            exp: (now + Duration::days(self.refresh_ttl_days)).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| TokenError::Generation(e.to_string()))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        decode::<AccessClaims>(token, &self.access_decoding, &strict_validation())
            .map(|data| data.claims)
            .map_err(classify_error)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        decode::<RefreshClaims>(token, &self.refresh_decoding, &strict_validation())
            .map(|data| data.claims)
            .map_err(classify_error)
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }
}

fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    // No expiry grace period: an expired token is rejected immediately
    validation.leeway = 0;
    validation
}

fn classify_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    }
}
