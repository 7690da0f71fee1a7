use axum::{
    extract::{Query, State},
    response::Redirect,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::auth::REFRESH_COOKIE;
use crate::store::NewUser;
use crate::AppState;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const STATE_COOKIE: &str = "oauthState";

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: String,
}

/// GET /auth/google
///
/// Redirects to Google's consent screen with a nonce bound to this browser
/// through a short-lived cookie.
pub async fn google_redirect(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let nonce = Uuid::new_v4().simple().to_string();

    let mut cookie = Cookie::new(STATE_COOKIE, nonce.clone());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(crate::is_production!());
    cookie.set_same_site(SameSite::Lax);

    let url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile&state={}",
        GOOGLE_AUTH_URL,
        state.config.oauth.google_client_id,
        state.config.oauth.google_callback_url,
        nonce,
    );

    (jar.add(cookie), Redirect::temporary(&url))
}

/// GET /auth/google/callback
///
/// Exchanges the authorization code, resolves the Google account's email and
/// signs the user in, creating the account on first sight. The email doubles
/// as the username for OAuth accounts.
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let expected = jar
        .get(STATE_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::bad_request("Missing OAuth state"))?;
    if expected != params.state {
        tracing::warn!("OAuth state mismatch");
        return Err(ApiError::bad_request("Invalid OAuth state"));
    }

    let token: TokenResponse = state
        .http
        .post(GOOGLE_TOKEN_URL)
        .form(&[
            ("code", params.code.as_str()),
            ("client_id", state.config.oauth.google_client_id.as_str()),
            (
                "client_secret",
                state.config.oauth.google_client_secret.as_str(),
            ),
            (
                "redirect_uri",
                state.config.oauth.google_callback_url.as_str(),
            ),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            tracing::error!("OAuth code exchange failed: {}", e);
            ApiError::bad_request("OAuth code exchange failed")
        })?
        .json()
        .await
        .map_err(|e| {
            tracing::error!("OAuth token response malformed: {}", e);
            ApiError::bad_request("OAuth code exchange failed")
        })?;

    let info: UserInfo = state
        .http
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(&token.access_token)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            tracing::error!("OAuth userinfo fetch failed: {}", e);
            ApiError::bad_request("OAuth profile fetch failed")
        })?
        .json()
        .await
        .map_err(|e| {
            tracing::error!("OAuth userinfo response malformed: {}", e);
            ApiError::bad_request("OAuth profile fetch failed")
        })?;

    let (user, record) = match state.store.find_user_by_username(&info.email).await? {
        Some(user) => {
            let record = state.store.insert_refresh_token(user.id).await?;
            (user, record)
        }
        None => {
            tracing::info!(email = %info.email, "creating account from OAuth profile");
            state
                .store
                .create_user(NewUser::oauth(info.email.clone(), info.email.clone()))
                .await?
        }
    };

    let access_token = state.tokens.issue_access_token(user.id)?;
    let refresh_token = state.tokens.issue_refresh_token(user.id, record.id)?;

    let mut refresh_cookie = Cookie::new(REFRESH_COOKIE, format!("Bearer {refresh_token}"));
    refresh_cookie.set_path("/");
    refresh_cookie.set_http_only(true);
    refresh_cookie.set_secure(crate::is_production!());
    refresh_cookie.set_same_site(SameSite::Strict);

    let mut state_removal = Cookie::from(STATE_COOKIE);
    state_removal.set_path("/");
    let jar = jar.remove(state_removal).add(refresh_cookie);

    Ok((
        jar,
        Json(json!({
            "accessToken": format!("Bearer {access_token}"),
        })),
    ))
}
