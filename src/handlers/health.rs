use axum::Json;
use serde_json::{json, Value};

/// Liveness probe; exempt from every pipeline stage.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
