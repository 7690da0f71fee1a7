use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::middleware::security::CurrentUser;
use crate::pipeline::risk::RiskAssessment;

/// GET /me
///
/// Profile of the authenticated principal, plus the risk verdict for this
/// request when the risk stage produced one.
pub async fn me(
    CurrentUser(user): CurrentUser,
    risk: Option<Extension<RiskAssessment>>,
) -> Json<Value> {
    let mut body = json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "role": user.role,
        "createdAt": user.created_at,
    });
    if let Some(Extension(risk)) = risk {
        body["riskScore"] = json!(risk.risk_score);
        body["riskDegraded"] = json!(risk.degraded);
    }
    Json(body)
}
