use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use uuid::Uuid;

use crate::middleware::security::CurrentUser;
use crate::pipeline::context::client_ip;
use crate::pipeline::risk::RiskAssessment;
use crate::AppState;

/// What an observer sees for each completed request.
#[derive(Debug, Clone)]
pub struct ObservedRequest {
    pub method: String,
    pub path: String,
    pub ip: String,
    pub principal: Option<Uuid>,
    pub risk_score: Option<f64>,
    pub status: u16,
    /// Response body when it was JSON.
    pub body: Option<Value>,
    pub elapsed_ms: u64,
}

/// Post-response hook. Observers run after the response is produced and can
/// never change it; a slow or failing observer must not hold up the reply,
/// so implementations stay synchronous and cheap.
pub trait ResponseObserver: Send + Sync {
    fn observe(&self, record: &ObservedRequest);
}

/// Default observer: one structured access-log line per request.
pub struct LoggingObserver;

impl ResponseObserver for LoggingObserver {
    fn observe(&self, record: &ObservedRequest) {
        tracing::info!(
            method = %record.method,
            path = %record.path,
            ip = %record.ip,
            principal = ?record.principal,
            risk_score = ?record.risk_score,
            status = record.status,
            elapsed_ms = record.elapsed_ms,
            "request completed"
        );
    }
}

pub type SharedObservers = Arc<Vec<Box<dyn ResponseObserver>>>;

/// Layered outside the rejecting middleware (rate limit, CSRF, security
/// pipeline) so denied requests are logged too. The principal and risk
/// verdict come from the response extensions, where the security middleware
/// places them for both passed and rejected requests.
pub async fn observer_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();

    let (parts, body) = request.into_parts();
    let ip = client_ip(&parts);
    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();
    let request = Request::from_parts(parts, body);

    let response = next.run(request).await;
    let status = response.status();
    let principal = response.extensions().get::<CurrentUser>().map(|u| u.0.id);
    let risk_score = response
        .extensions()
        .get::<RiskAssessment>()
        .map(|r| r.risk_score);

    // Buffer the response so observers see the body by value; replies on
    // this API are small JSON documents.
    let (response_parts, response_body) = response.into_parts();
    let bytes = axum::body::to_bytes(response_body, usize::MAX)
        .await
        .unwrap_or_default();

    let record = ObservedRequest {
        method,
        path,
        ip,
        principal,
        risk_score,
        status: status.as_u16(),
        body: serde_json::from_slice(&bytes).ok(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    for observer in state.observers.iter() {
        observer.observe(&record);
    }

    Response::from_parts(response_parts, Body::from(bytes))
}
