mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use common::{body_json, json_request, raw_token, spawn_app, test_config, TestApp};
use gatekeeper_api::store::UserStore;

/// The `refreshToken=Bearer <jwt>` pair from a response's set-cookie header.
fn refresh_cookie_pair(response: &axum::http::Response<axum::body::Body>) -> String {
    response
        .headers()
        .get("set-cookie")
        .expect("refresh cookie missing")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

async fn signup(app: &TestApp) -> axum::http::Response<axum::body::Body> {
    let response = app
        .send(json_request(
            "POST",
            "/auth/signup",
            &json!({"username": "alice", "password": "Secr3t!23"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response
}

#[tokio::test]
async fn refresh_from_cookie_issues_new_access_token() {
    let app = spawn_app(test_config());
    let cookie = refresh_cookie_pair(&signup(&app).await);

    let request = Request::builder()
        .method("POST")
        .uri("/refresh")
        .header("cookie", cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["accessToken"].as_str().unwrap().starts_with("Bearer "));
}

#[tokio::test]
async fn refresh_from_body_for_mobile_clients() {
    let app = spawn_app(test_config());
    signup(&app).await;

    let login = app
        .send(json_request(
            "POST",
            "/auth/login",
            &json!({"username": "alice", "password": "Secr3t!23", "isMobile": true}),
        ))
        .await;
    let login_body = body_json(login).await;
    let refresh_token = login_body["refreshToken"].as_str().unwrap().to_string();

    let response = app
        .send(json_request(
            "POST",
            "/refresh",
            &json!({ "refreshToken": refresh_token }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn revoked_refresh_token_rejected() {
    let app = spawn_app(test_config());
    let cookie = refresh_cookie_pair(&signup(&app).await);

    // Logout deletes the backing record
    let logout = Request::builder()
        .method("GET")
        .uri("/logout")
        .header("cookie", cookie.clone())
        .body(Body::empty())
        .unwrap();
    let response = app.send(logout).await;
    assert_eq!(response.status(), StatusCode::OK);

    let user = app
        .store
        .find_user_by_username("alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(app.store.refresh_token_count(user.id), 0);

    // The token still carries a valid signature, but its record is gone
    let request = Request::builder()
        .method("POST")
        .uri("/refresh")
        .header("cookie", cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_refresh_token_rejected() {
    let app = spawn_app(test_config());

    let response = app
        .send(json_request(
            "POST",
            "/refresh",
            &json!({"refreshToken": "Bearer not-a-jwt"}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn access_token_cannot_refresh() {
    // Access tokens are signed with a different secret and must not pass
    // the refresh verifier
    let app = spawn_app(test_config());
    let body = body_json(signup(&app).await).await;
    let access = raw_token(&body, "accessToken");

    let response = app
        .send(json_request(
            "POST",
            "/refresh",
            &json!({"refreshToken": format!("Bearer {access}")}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
