use axum::{extract::State, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::{json, Value};

use crate::middleware::csrf::CSRF_COOKIE;
use crate::AppState;

/// POST /csrf-token
///
/// Issues the signed double-submit token: set as an HTTP-only cookie here,
/// echoed back by the client in the `x-csrf-token` header on state-changing
/// requests.
pub async fn issue_csrf_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<Value>) {
    let token = state.csrf.issue();

    let mut cookie = Cookie::new(CSRF_COOKIE, token.clone());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(crate::is_production!());
    cookie.set_same_site(SameSite::Strict);

    (jar.add(cookie), Json(json!({ "csrfToken": token })))
}
