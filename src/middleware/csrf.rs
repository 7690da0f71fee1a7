use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_COOKIE: &str = "csrfToken";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Stateless double-submit CSRF tokens: `<nonce>.<hmac-sha256(nonce)>` signed
/// with the session secret, so no server-side token table is needed.
#[derive(Clone)]
pub struct CsrfGuard {
    key: Vec<u8>,
}

impl CsrfGuard {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    pub fn issue(&self) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        let tag = self.sign(&nonce);
        format!("{nonce}.{tag}")
    }

    fn sign(&self, nonce: &str) -> String {
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac key");
        mac.update(nonce.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn verify(&self, token: &str) -> bool {
        let Some((nonce, tag)) = token.split_once('.') else {
            return false;
        };
        let Ok(tag) = hex::decode(tag) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac key");
        mac.update(nonce.as_bytes());
        mac.verify_slice(&tag).is_ok()
    }
}

fn tokens_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Double-submit CSRF check for state-changing requests.
///
/// Safe methods and the unauthenticated entry points pass through. Everything
/// else must present the signed token both as the `csrfToken` cookie and the
/// `x-csrf-token` header, with the two matching.
pub async fn csrf_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    if state.config.auth.exempt_paths.iter().any(|p| p == &path) {
        return next.run(request).await;
    }

    let cookie_token = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());
    let header_token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    match (cookie_token, header_token) {
        (Some(cookie), Some(header))
            if tokens_match(&cookie, &header) && state.csrf.verify(&cookie) =>
        {
            next.run(request).await
        }
        _ => {
            tracing::warn!(method = %method, path = %path, "CSRF token check failed");
            ApiError::forbidden("Invalid CSRF token").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_verify_roundtrip() {
        let guard = CsrfGuard::new("test_session_secret");
        let token = guard.issue();
        assert!(guard.verify(&token));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let guard = CsrfGuard::new("test_session_secret");
        let token = guard.issue();
        let (nonce, tag) = token.split_once('.').unwrap();
        let forged = format!("{}x.{}", nonce, tag);
        assert!(!guard.verify(&forged));
    }

    #[test]
    fn test_foreign_key_rejected() {
        let token = CsrfGuard::new("secret_a").issue();
        assert!(!CsrfGuard::new("secret_b").verify(&token));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let guard = CsrfGuard::new("test_session_secret");
        assert!(!guard.verify("no-dot-here"));
        assert!(!guard.verify("nonce.not-hex"));
        assert!(!guard.verify(""));
    }
}
