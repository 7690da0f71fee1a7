use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::RiskConfig;
use crate::error::ApiError;
use crate::pipeline::injection::{contains_injection, query_contains_injection};
use crate::pipeline::{Outcome, RequestContext, SecurityStage};

const ASSESSMENT_PATH: &str = "/api/v1/security/risk-assessment";

/// Verdict of the remote risk service, attached to the request context once
/// the stage passes.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub blocked: bool,
    pub risk_factors: Vec<String>,
    pub highest_risk_factor: Option<String>,
    pub recommendation: Option<String>,
    /// True when the service was unreachable and the fail-open policy let
    /// the request through without a real score.
    pub degraded: bool,
}

impl RiskAssessment {
    fn degraded() -> Self {
        Self {
            risk_score: 0.0,
            blocked: false,
            risk_factors: Vec::new(),
            highest_risk_factor: None,
            recommendation: None,
            degraded: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RiskResponse {
    risk_score: f64,
    #[serde(default)]
    blocked: bool,
    #[serde(default)]
    risk_factors: Vec<String>,
    highest_risk_factor: Option<String>,
    details: Option<RiskDetails>,
}

#[derive(Debug, Deserialize)]
struct RiskDetails {
    recommendation: Option<String>,
}

impl From<RiskResponse> for RiskAssessment {
    fn from(resp: RiskResponse) -> Self {
        Self {
            risk_score: resp.risk_score,
            blocked: resp.blocked,
            risk_factors: resp.risk_factors,
            highest_risk_factor: resp.highest_risk_factor,
            recommendation: resp.details.and_then(|d| d.recommendation),
            degraded: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RiskClientError {
    #[error("risk service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("risk service returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("risk service response did not parse: {0}")]
    Malformed(serde_json::Error),
}

/// Thin reqwest wrapper around the assessment endpoint. One attempt per
/// call; the stage owns the retry loop.
struct RiskClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl RiskClient {
    fn new(config: &RiskConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), ASSESSMENT_PATH),
            api_key: config.api_key.clone(),
        }
    }

    async fn assess(&self, payload: &Value) -> Result<RiskResponse, RiskClientError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RiskClientError::Status(response.status()));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(RiskClientError::Malformed)
    }
}

/// Remote risk-assessment stage.
///
/// Whitelisted IPs and configured paths skip the check. Everything else is
/// screened locally for SQL-injection markers, then scored by the remote
/// service with bounded retries. An empty base URL disables the remote call
/// entirely, leaving only the local screen active.
pub struct RiskStage {
    config: RiskConfig,
    client: Option<RiskClient>,
}

impl RiskStage {
    pub fn new(config: RiskConfig) -> Self {
        let client = if config.base_url.is_empty() {
            None
        } else {
            Some(RiskClient::new(&config))
        };
        Self { config, client }
    }

    fn request_payload(ctx: &RequestContext) -> Value {
        json!({
            "ip": ctx.ip,
            "method": ctx.method,
            "path": ctx.path,
            "headers": ctx.headers,
            "query": ctx.query,
            "body": ctx.body,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }

    fn injection_screen(&self, ctx: &RequestContext) -> Option<Outcome> {
        let query_hit = ctx
            .query
            .as_deref()
            .map(query_contains_injection)
            .unwrap_or(false);
        let body_hit = ctx.body.as_ref().map(contains_injection).unwrap_or(false);

        if query_hit || body_hit {
            tracing::warn!(
                ip = %ctx.ip,
                method = %ctx.method,
                path = %ctx.path,
                "SQL injection attempt detected"
            );
            return Some(Outcome::deny(
                "request matched SQL injection patterns",
                ApiError::forbidden_with_details(
                    "Potential SQL injection detected",
                    json!("Request contains suspicious SQL patterns"),
                ),
            ));
        }
        None
    }

    fn verdict(&self, ctx: &mut RequestContext, assessment: RiskAssessment) -> Outcome {
        if assessment.blocked || assessment.risk_score > self.config.threshold {
            tracing::warn!(
                ip = %ctx.ip,
                method = %ctx.method,
                path = %ctx.path,
                risk_score = assessment.risk_score,
                threshold = self.config.threshold,
                highest_risk_factor = ?assessment.highest_risk_factor,
                "high risk request blocked"
            );
            return Outcome::deny(
                format!(
                    "risk score {} over threshold {}",
                    assessment.risk_score, self.config.threshold
                ),
                ApiError::forbidden_with_details(
                    "Request blocked due to security risk",
                    json!({
                        "riskScore": assessment.risk_score,
                        "threshold": self.config.threshold,
                        "highestRiskFactor": assessment.highest_risk_factor,
                        "recommendation": assessment.recommendation,
                    }),
                ),
            );
        }

        tracing::info!(
            ip = %ctx.ip,
            path = %ctx.path,
            risk_score = assessment.risk_score,
            risk_factors = ?assessment.risk_factors,
            "security check passed"
        );
        ctx.risk = Some(assessment);
        Outcome::Allow
    }
}

#[async_trait]
impl SecurityStage for RiskStage {
    fn name(&self) -> &'static str {
        "risk"
    }

    async fn evaluate(&self, ctx: &mut RequestContext) -> Outcome {
        if self.config.whitelisted_ips.iter().any(|ip| ip == &ctx.ip) {
            tracing::info!(ip = %ctx.ip, path = %ctx.path, "request allowed from whitelisted IP");
            return Outcome::Allow;
        }
        if self.config.skip_paths.iter().any(|p| p == &ctx.path) {
            tracing::debug!(path = %ctx.path, "risk check skipped for path");
            return Outcome::Allow;
        }

        if let Some(denied) = self.injection_screen(ctx) {
            return denied;
        }

        let client = match &self.client {
            Some(client) => client,
            None => return Outcome::Allow,
        };

        let payload = Self::request_payload(ctx);
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let started = Instant::now();
            let result = client.assess(&payload).await;
            let elapsed = started.elapsed();

            if elapsed.as_millis() > self.config.slow_warn_ms {
                tracing::warn!(
                    duration_ms = elapsed.as_millis() as u64,
                    path = %ctx.path,
                    ip = %ctx.ip,
                    "slow risk assessment"
                );
            }

            match result {
                Ok(response) => return self.verdict(ctx, response.into()),
                Err(e) if attempt < max_attempts => {
                    tracing::debug!(
                        attempt,
                        max_attempts,
                        path = %ctx.path,
                        ip = %ctx.ip,
                        error = %e,
                        "retrying risk assessment"
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
                Err(e) => {
                    tracing::error!(
                        attempts = max_attempts,
                        path = %ctx.path,
                        ip = %ctx.ip,
                        error = %e,
                        "risk service unavailable"
                    );
                    if self.config.fail_open {
                        tracing::warn!(
                            ip = %ctx.ip,
                            path = %ctx.path,
                            "allowing request despite risk service failure"
                        );
                        ctx.risk = Some(RiskAssessment::degraded());
                        return Outcome::Allow;
                    }
                    return Outcome::Error {
                        error: ApiError::service_unavailable(
                            "Security assessment is temporarily unavailable",
                        ),
                    };
                }
            }
        }

        // max_attempts >= 1, so the loop always returns
        unreachable!("risk retry loop exited without a verdict")
    }
}
