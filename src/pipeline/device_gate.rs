use async_trait::async_trait;

use crate::error::ApiError;
use crate::geo::SharedGeoResolver;
use crate::pipeline::{Outcome, RequestContext, SecurityStage};

/// Why a dimension refused its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// The dimension has an allow-list and the value is not on it.
    DeniedNotAllowed,
    /// The value is on the dimension's deny-list.
    DeniedBlocked,
}

/// Allow/deny list evaluation for one dimension.
///
/// Precedence, checked in order:
/// 1. both lists empty: the dimension is unrestricted
/// 2. deny-list empty: membership in the allow-list decides
/// 3. value on the deny-list: refused
/// 4. value on the allow-list: permitted
/// 5. otherwise refused
///
/// A deny-list entry wins over an allow-list entry for the same value, and a
/// non-empty deny-list closes the dimension to values on neither list even
/// when the allow-list is empty.
pub fn evaluate_lists(value: &str, allowed: &[String], blocked: &[String]) -> GateDecision {
    let in_list = |list: &[String]| list.iter().any(|entry| entry == value);

    if allowed.is_empty() && blocked.is_empty() {
        return GateDecision::Allow;
    }
    if blocked.is_empty() {
        return if in_list(allowed) {
            GateDecision::Allow
        } else {
            GateDecision::DeniedNotAllowed
        };
    }
    if in_list(blocked) {
        return GateDecision::DeniedBlocked;
    }
    if in_list(allowed) {
        return GateDecision::Allow;
    }
    if allowed.is_empty() {
        GateDecision::DeniedBlocked
    } else {
        GateDecision::DeniedNotAllowed
    }
}

/// Per-user device/origin gate.
///
/// Checks the request's IP, resolved country, user-agent string and OS
/// against the principal's allow/deny list pairs, always in that order, and
/// refuses on the first dimension that fails. Runs only for authenticated
/// requests; anonymous traffic has no lists to check.
pub struct DeviceGateStage {
    geo: SharedGeoResolver,
    permit_unresolved_country: bool,
}

impl DeviceGateStage {
    pub fn new(geo: SharedGeoResolver, permit_unresolved_country: bool) -> Self {
        Self {
            geo,
            permit_unresolved_country,
        }
    }

    fn deny_for(dimension: &str, value: &str, decision: GateDecision) -> Outcome {
        let detail = match decision {
            GateDecision::DeniedNotAllowed => "not in the allow list",
            GateDecision::DeniedBlocked => "in the deny list",
            GateDecision::Allow => unreachable!("deny_for called on an allowed value"),
        };
        Outcome::deny(
            format!("{dimension} '{value}' {detail}"),
            ApiError::forbidden(format!("Access denied: your {dimension} is {detail}")),
        )
    }
}

#[async_trait]
impl SecurityStage for DeviceGateStage {
    fn name(&self) -> &'static str {
        "device_gate"
    }

    async fn evaluate(&self, ctx: &mut RequestContext) -> Outcome {
        let user = match &ctx.principal {
            Some(user) => user.clone(),
            None => return Outcome::Allow,
        };

        let ip_decision = evaluate_lists(&ctx.ip, &user.allowed_ips, &user.blocked_ips);
        if ip_decision != GateDecision::Allow {
            tracing::info!(principal = %user.id, ip = %ctx.ip, "device gate refused IP");
            return Self::deny_for("IP address", &ctx.ip, ip_decision);
        }

        if !user.allowed_countries.is_empty() || !user.blocked_countries.is_empty() {
            match self.geo.country_for(&ctx.ip) {
                Some(country) => {
                    let decision =
                        evaluate_lists(&country, &user.allowed_countries, &user.blocked_countries);
                    if decision != GateDecision::Allow {
                        tracing::info!(
                            principal = %user.id,
                            ip = %ctx.ip,
                            country = %country,
                            "device gate refused country"
                        );
                        return Self::deny_for("country", &country, decision);
                    }
                }
                None if self.permit_unresolved_country => {
                    tracing::debug!(
                        principal = %user.id,
                        ip = %ctx.ip,
                        "country unresolved, dimension skipped"
                    );
                }
                None => {
                    tracing::info!(
                        principal = %user.id,
                        ip = %ctx.ip,
                        "device gate refused unresolvable country"
                    );
                    return Outcome::deny(
                        format!("country for '{}' could not be resolved", ctx.ip),
                        ApiError::forbidden("Access denied: your origin country could not be determined"),
                    );
                }
            }
        }

        let ua_decision = evaluate_lists(
            &ctx.user_agent,
            &user.allowed_user_agents,
            &user.blocked_user_agents,
        );
        if ua_decision != GateDecision::Allow {
            tracing::info!(
                principal = %user.id,
                user_agent = %ctx.user_agent,
                "device gate refused user agent"
            );
            return Self::deny_for("user agent", &ctx.user_agent, ua_decision);
        }

        let os_decision = evaluate_lists(&ctx.client.os, &user.allowed_os, &user.blocked_os);
        if os_decision != GateDecision::Allow {
            tracing::info!(principal = %user.id, os = %ctx.client.os, "device gate refused OS");
            return Self::deny_for("operating system", &ctx.client.os, os_decision);
        }

        tracing::debug!(principal = %user.id, ip = %ctx.ip, "device gate passed");
        Outcome::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::FixedGeoResolver;
    use crate::store::User;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn list(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    fn open_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: None,
            password_hash: None,
            role: "USER".to_string(),
            allowed_ips: Vec::new(),
            blocked_ips: Vec::new(),
            allowed_countries: Vec::new(),
            blocked_countries: Vec::new(),
            allowed_user_agents: Vec::new(),
            blocked_user_agents: Vec::new(),
            allowed_os: Vec::new(),
            blocked_os: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn context_for(user: Option<User>) -> RequestContext {
        let req = Request::builder()
            .uri("/me")
            .header("x-forwarded-for", "203.0.113.7")
            .header(
                "user-agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )
            .body(Body::empty())
            .unwrap();
        let (parts, _) = req.into_parts();
        let mut ctx = RequestContext::from_parts(&parts, b"");
        ctx.principal = user;
        ctx
    }

    fn stage(country: Option<&str>) -> DeviceGateStage {
        DeviceGateStage::new(
            Arc::new(FixedGeoResolver(country.map(|c| c.to_string()))),
            true,
        )
    }

    #[test]
    fn test_both_lists_empty_allows() {
        assert_eq!(evaluate_lists("x", &[], &[]), GateDecision::Allow);
    }

    #[test]
    fn test_allow_list_restricts_when_deny_empty() {
        let allowed = list(&["1.2.3.4"]);
        assert_eq!(evaluate_lists("1.2.3.4", &allowed, &[]), GateDecision::Allow);
        assert_eq!(
            evaluate_lists("5.6.7.8", &allowed, &[]),
            GateDecision::DeniedNotAllowed
        );
    }

    #[test]
    fn test_deny_list_wins_over_allow_list() {
        let allowed = list(&["1.2.3.4"]);
        let blocked = list(&["1.2.3.4"]);
        assert_eq!(
            evaluate_lists("1.2.3.4", &allowed, &blocked),
            GateDecision::DeniedBlocked
        );
    }

    #[test]
    fn test_nonempty_deny_list_closes_dimension() {
        // Value on neither list while a deny-list exists is refused
        let blocked = list(&["9.9.9.9"]);
        assert_eq!(
            evaluate_lists("1.2.3.4", &[], &blocked),
            GateDecision::DeniedBlocked
        );
    }

    #[tokio::test]
    async fn test_anonymous_request_passes() {
        let mut ctx = context_for(None);
        assert!(matches!(stage(None).evaluate(&mut ctx).await, Outcome::Allow));
    }

    #[tokio::test]
    async fn test_blocked_ip_denied() {
        let mut user = open_user();
        user.blocked_ips = list(&["203.0.113.7"]);
        let mut ctx = context_for(Some(user));

        match stage(None).evaluate(&mut ctx).await {
            Outcome::Deny { error, .. } => {
                assert_eq!(error.status_code(), axum::http::StatusCode::FORBIDDEN);
                assert!(error.message().contains("IP address"));
            }
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_country_allow_list_enforced() {
        let mut user = open_user();
        user.allowed_countries = list(&["AU"]);
        let mut ctx = context_for(Some(user.clone()));

        assert!(matches!(
            stage(Some("AU")).evaluate(&mut ctx).await,
            Outcome::Allow
        ));

        let mut ctx = context_for(Some(user));
        match stage(Some("US")).evaluate(&mut ctx).await {
            Outcome::Deny { error, .. } => assert!(error.message().contains("country")),
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unresolved_country_follows_policy() {
        let mut user = open_user();
        user.allowed_countries = list(&["AU"]);

        // Permissive: the dimension is skipped entirely
        let mut ctx = context_for(Some(user.clone()));
        assert!(matches!(stage(None).evaluate(&mut ctx).await, Outcome::Allow));

        // Strict: unresolvable origin is refused
        let strict = DeviceGateStage::new(Arc::new(FixedGeoResolver(None)), false);
        let mut ctx = context_for(Some(user));
        assert!(matches!(
            strict.evaluate(&mut ctx).await,
            Outcome::Deny { .. }
        ));
    }

    #[tokio::test]
    async fn test_blocked_os_denied() {
        let mut user = open_user();
        user.blocked_os = list(&["Windows"]);
        let mut ctx = context_for(Some(user));

        match stage(None).evaluate(&mut ctx).await {
            Outcome::Deny { reason, .. } => assert!(reason.contains("Windows")),
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_evaluation_is_idempotent() {
        let mut user = open_user();
        user.allowed_ips = list(&["203.0.113.7"]);
        let mut ctx = context_for(Some(user));
        let gate = stage(None);

        assert!(matches!(gate.evaluate(&mut ctx).await, Outcome::Allow));
        assert!(matches!(gate.evaluate(&mut ctx).await, Outcome::Allow));
    }
}
