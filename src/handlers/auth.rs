use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::password;
use crate::error::ApiError;
use crate::store::NewUser;
use crate::AppState;

pub const REFRESH_COOKIE: &str = "refreshToken";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    /// Mobile clients get the refresh token in the body as well, since they
    /// cannot use the HTTP-only cookie.
    #[serde(default)]
    pub is_mobile: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub is_mobile: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn refresh_cookie(value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(REFRESH_COOKIE, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(crate::is_production!());
    cookie.set_same_site(SameSite::Strict);
    cookie
}

fn cleared_refresh_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(REFRESH_COOKIE, "");
    cookie.set_path("/");
    cookie
}

fn validate_credentials(username: &str, password: &str) -> Result<(), ApiError> {
    if username.trim().len() < 3 {
        return Err(ApiError::bad_request(
            "Username must be at least 3 characters",
        ));
    }
    if password.len() < 8 {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters",
        ));
    }
    Ok(())
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<Value>), ApiError> {
    validate_credentials(&req.username, &req.password)?;

    let password_hash = password::hash_password(&req.password).map_err(|e| {
        tracing::error!("Password hashing failed: {}", e);
        ApiError::internal_server_error("Failed to create account")
    })?;

    // Duplicate usernames surface from the store as a 409 conflict
    let (user, record) = state
        .store
        .create_user(NewUser::local(req.username.trim(), password_hash))
        .await?;

    let access_token = state.tokens.issue_access_token(user.id)?;
    let refresh_token = state.tokens.issue_refresh_token(user.id, record.id)?;

    tracing::info!(principal = %user.id, username = %user.username, "user created");

    let jar = jar.add(refresh_cookie(format!("Bearer {refresh_token}")));
    let mut body = json!({
        "message": "User created successfully",
        "accessToken": format!("Bearer {access_token}"),
    });
    if req.is_mobile {
        body["refreshToken"] = json!(format!("Bearer {refresh_token}"));
    }

    Ok((StatusCode::CREATED, jar, Json(body)))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let user = state
        .store
        .find_user_by_username(req.username.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    // OAuth-only accounts have no stored hash and cannot log in with a password
    let verified = user
        .password_hash
        .as_deref()
        .map(|hash| password::verify_password(&req.password, hash))
        .unwrap_or(false);
    if !verified {
        return Err(ApiError::bad_request("Incorrect password"));
    }

    let record = state.store.insert_refresh_token(user.id).await?;
    let access_token = state.tokens.issue_access_token(user.id)?;
    let refresh_token = state.tokens.issue_refresh_token(user.id, record.id)?;

    tracing::info!(principal = %user.id, username = %user.username, "login succeeded");

    let jar = jar.add(refresh_cookie(format!("Bearer {refresh_token}")));
    let mut body = json!({
        "accessToken": format!("Bearer {access_token}"),
    });
    if req.is_mobile {
        body["refreshToken"] = json!(format!("Bearer {refresh_token}"));
    }

    Ok((jar, Json(body)))
}

/// POST /refresh
///
/// The refresh token comes from the HTTP-only cookie for web clients or the
/// request body for mobile ones. The embedded record id must still exist;
/// logout deletes it, which revokes every copy of the token.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<Json<Value>, ApiError> {
    let raw = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|Json(req)| req.refresh_token))
        .ok_or_else(|| ApiError::unauthorized("Refresh token missing"))?;
    let raw = raw.strip_prefix("Bearer ").unwrap_or(&raw).trim();

    let claims = state.tokens.verify_refresh_token(raw)?;

    let record = state
        .store
        .find_refresh_token(claims.jti)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;
    if record.user_id != claims.sub {
        return Err(ApiError::unauthorized("Invalid or expired token"));
    }

    let access_token = state.tokens.issue_access_token(claims.sub)?;
    tracing::debug!(principal = %claims.sub, "access token refreshed");

    Ok(Json(json!({
        "accessToken": format!("Bearer {access_token}"),
    })))
}

/// GET /logout
///
/// Revokes the refresh-token record named by the cookie and clears the
/// cookie. Idempotent: logging out twice is not an error.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        let raw = cookie.value();
        let raw = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
        if let Ok(claims) = state.tokens.verify_refresh_token(raw) {
            let deleted = state.store.delete_refresh_token(claims.jti).await?;
            tracing::info!(principal = %claims.sub, deleted, "logout");
        }
    }

    let jar = jar.remove(cleared_refresh_cookie());
    Ok((jar, Json(json!({ "message": "Logged out successfully" }))))
}
