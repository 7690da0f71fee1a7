//! Request security pipeline.
//!
//! Every non-static decision about an inbound request happens here: path
//! exemption, bearer-token authentication, the device/origin gate and the
//! remote risk assessment. Stages run strictly in registration order and the
//! first non-Allow outcome stops the chain; no stage runs after a rejection.

use std::time::Instant;

use async_trait::async_trait;

use crate::error::ApiError;

pub mod auth_stage;
pub mod context;
pub mod device_gate;
pub mod injection;
pub mod risk;

pub use auth_stage::AuthStage;
pub use context::RequestContext;
pub use device_gate::DeviceGateStage;
pub use risk::RiskStage;

/// Stage verdict. `Deny` is a policy rejection (the request was understood
/// and refused); `Error` is an infrastructure failure surfacing as 5xx.
#[derive(Debug)]
pub enum Outcome {
    Allow,
    Deny { reason: String, error: ApiError },
    Error { error: ApiError },
}

impl Outcome {
    pub fn deny(reason: impl Into<String>, error: ApiError) -> Self {
        Outcome::Deny {
            reason: reason.into(),
            error,
        }
    }
}

/// A single gate in the per-request chain.
#[async_trait]
pub trait SecurityStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn evaluate(&self, ctx: &mut RequestContext) -> Outcome;
}

/// Ordered stage chain, built once at process start and shared across
/// requests. Stages hold their own injected dependencies (store, token
/// verifier, geo resolver, risk client).
pub struct SecurityPipeline {
    stages: Vec<Box<dyn SecurityStage>>,
}

impl SecurityPipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn register(mut self, stage: Box<dyn SecurityStage>) -> Self {
        tracing::debug!("Registered security stage '{}'", stage.name());
        self.stages.push(stage);
        self
    }

    /// Run the chain for one request. Returns the mapped rejection of the
    /// first stage that refuses; transitions are one-directional and no
    /// state is revisited.
    ///
    /// Cancellation is cooperative: when the client connection closes the
    /// task driving this future is dropped, abandoning in-flight stages and
    /// skipping the finish log.
    pub async fn evaluate(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let started = Instant::now();

        for stage in &self.stages {
            match stage.evaluate(ctx).await {
                Outcome::Allow => {
                    tracing::trace!(stage = stage.name(), path = %ctx.path, "stage passed");
                }
                Outcome::Deny { reason, error } => {
                    tracing::warn!(
                        stage = stage.name(),
                        method = %ctx.method,
                        path = %ctx.path,
                        principal = ?ctx.principal_id(),
                        reason = %reason,
                        "request rejected"
                    );
                    return Err(error);
                }
                Outcome::Error { error } => {
                    tracing::error!(
                        stage = stage.name(),
                        method = %ctx.method,
                        path = %ctx.path,
                        principal = ?ctx.principal_id(),
                        error = %error,
                        "stage failed"
                    );
                    return Err(error);
                }
            }
        }

        tracing::debug!(
            method = %ctx.method,
            path = %ctx.path,
            principal = ?ctx.principal_id(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "security pipeline passed"
        );
        Ok(())
    }
}

impl Default for SecurityPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn test_context() -> RequestContext {
        let (parts, _) = Request::builder()
            .uri("/me")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        RequestContext::from_parts(&parts, b"")
    }

    struct FixedStage {
        name: &'static str,
        allow: bool,
    }

    #[async_trait]
    impl SecurityStage for FixedStage {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn evaluate(&self, _ctx: &mut RequestContext) -> Outcome {
            if self.allow {
                Outcome::Allow
            } else {
                Outcome::deny("refused", ApiError::forbidden("refused"))
            }
        }
    }

    #[tokio::test]
    async fn test_first_rejection_short_circuits() {
        // A panicking stage after the denial proves nothing runs past it
        struct PanicStage;

        #[async_trait]
        impl SecurityStage for PanicStage {
            fn name(&self) -> &'static str {
                "panic"
            }
            async fn evaluate(&self, _ctx: &mut RequestContext) -> Outcome {
                panic!("stage ran after a rejection");
            }
        }

        let pipeline = SecurityPipeline::new()
            .register(Box::new(FixedStage { name: "first", allow: true }))
            .register(Box::new(FixedStage { name: "deny", allow: false }))
            .register(Box::new(PanicStage));

        let mut ctx = test_context();
        let err = pipeline.evaluate(&mut ctx).await.unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_all_allow_passes() {
        let pipeline = SecurityPipeline::new()
            .register(Box::new(FixedStage { name: "a", allow: true }))
            .register(Box::new(FixedStage { name: "b", allow: true }));

        let mut ctx = test_context();
        assert!(pipeline.evaluate(&mut ctx).await.is_ok());
    }
}
