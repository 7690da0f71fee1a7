// Not every test binary uses every helper
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use gatekeeper_api::config::AppConfig;
use gatekeeper_api::geo::FixedGeoResolver;
use gatekeeper_api::store::MemoryStore;
use gatekeeper_api::{build_router, build_state};

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

/// Development defaults with deterministic secrets, the remote risk service
/// disabled and no retry sleeps.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.auth.access_token_secret = "test_access_secret".to_string();
    config.auth.refresh_token_secret = "test_refresh_secret".to_string();
    config.security.session_secret = "test_session_secret".to_string();
    config.security.enable_rate_limiting = false;
    config.risk.base_url = String::new();
    config.risk.retry_delay_ms = 0;
    config
}

pub fn spawn_app(config: AppConfig) -> TestApp {
    spawn_app_with_country(config, None)
}

/// Router backed by a fresh in-memory store, with every request's IP
/// resolving to the given country.
pub fn spawn_app_with_country(config: AppConfig, country: Option<&str>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let geo = Arc::new(FixedGeoResolver(country.map(|c| c.to_string())));
    let state = build_state(config, store.clone(), geo);
    TestApp {
        router: build_router(state),
        store,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<axum::body::Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router call failed")
    }
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request build failed")
}

pub fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request build failed")
}

pub async fn body_json(response: Response<axum::body::Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body read failed")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body was not JSON")
}

/// Strip the `Bearer ` prefix from a token field in a response body.
pub fn raw_token(body: &Value, field: &str) -> String {
    body[field]
        .as_str()
        .expect("token field missing")
        .strip_prefix("Bearer ")
        .expect("token missing Bearer prefix")
        .to_string()
}
