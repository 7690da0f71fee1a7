mod common;

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::json;
use tower::ServiceExt;

use gatekeeper_api::geo::FixedGeoResolver;
use gatekeeper_api::middleware::{ObservedRequest, ResponseObserver};
use gatekeeper_api::store::MemoryStore;
use gatekeeper_api::{build_router, build_state};

use common::{body_json, get_request, json_request, raw_token, test_config};

/// Collects every record so tests can assert on what was logged.
#[derive(Clone, Default)]
struct RecordingObserver {
    records: Arc<Mutex<Vec<ObservedRequest>>>,
}

impl RecordingObserver {
    fn records(&self) -> Vec<ObservedRequest> {
        self.records.lock().unwrap().clone()
    }
}

impl ResponseObserver for RecordingObserver {
    fn observe(&self, record: &ObservedRequest) {
        self.records.lock().unwrap().push(record.clone());
    }
}

fn spawn_observed_app() -> (Router, RecordingObserver) {
    let store = Arc::new(MemoryStore::new());
    let geo = Arc::new(FixedGeoResolver(None));
    let mut state = build_state(test_config(), store, geo);
    let recorder = RecordingObserver::default();
    state.observers = Arc::new(vec![Box::new(recorder.clone())]);
    (build_router(state), recorder)
}

async fn send(router: &Router, request: Request<Body>) -> axum::response::Response {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router call failed")
}

#[tokio::test]
async fn rejected_request_produces_access_log_record() {
    let (router, recorder) = spawn_observed_app();

    let response = send(&router, get_request("/me", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let records = recorder.records();
    let record = records
        .iter()
        .find(|r| r.path == "/me")
        .expect("rejected request was not observed");
    assert_eq!(record.status, 401);
    assert_eq!(record.method, "GET");
    assert!(record.principal.is_none());
    assert!(record.body.is_some());
}

#[tokio::test]
async fn csrf_rejection_produces_access_log_record() {
    let (router, recorder) = spawn_observed_app();

    let request = Request::builder()
        .method("POST")
        .uri("/me")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let records = recorder.records();
    let record = records
        .iter()
        .find(|r| r.path == "/me")
        .expect("CSRF rejection was not observed");
    assert_eq!(record.status, 403);
    assert_eq!(
        record.body.as_ref().unwrap()["message"],
        "Invalid CSRF token"
    );
}

#[tokio::test]
async fn completed_request_record_carries_principal() {
    let (router, recorder) = spawn_observed_app();

    let signup = json_request(
        "POST",
        "/auth/signup",
        &json!({"username": "observed_user", "password": "password123"}),
    );
    let response = send(&router, signup).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let access = raw_token(&body_json(response).await, "accessToken");

    let response = send(&router, get_request("/me", Some(&access))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let records = recorder.records();
    let record = records
        .iter()
        .find(|r| r.path == "/me")
        .expect("authenticated request was not observed");
    assert_eq!(record.status, 200);
    assert!(record.principal.is_some());
    assert_eq!(
        record.body.as_ref().unwrap()["username"],
        "observed_user"
    );
}
