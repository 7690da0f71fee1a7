use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::pipeline::risk::RiskAssessment;
use crate::store::User;
use crate::ua::{parse_user_agent, ClientInfo};

/// Per-request transient bag carried through the security pipeline.
/// Created when the request enters the pipeline, discarded when it leaves;
/// never persisted.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub ip: String,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    /// JSON request body, when the request carried one that parses.
    pub body: Option<Value>,
    pub user_agent: String,
    pub client: ClientInfo,
    /// Resolved by the authentication stage.
    pub principal: Option<User>,
    /// Attached by the risk stage.
    pub risk: Option<RiskAssessment>,
}

impl RequestContext {
    pub fn from_parts(parts: &Parts, body: &[u8]) -> Self {
        let headers: HashMap<String, String> = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let user_agent = headers
            .get("user-agent")
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());

        Self {
            ip: client_ip(parts),
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(|q| q.to_string()),
            client: parse_user_agent(&user_agent),
            user_agent,
            headers,
            body: if body.is_empty() {
                None
            } else {
                serde_json::from_slice(body).ok()
            },
            principal: None,
            risk: None,
        }
    }

    pub fn principal_id(&self) -> Option<uuid::Uuid> {
        self.principal.as_ref().map(|u| u.id)
    }
}

/// Client IP in precedence order: X-Forwarded-For (first hop), X-Real-IP,
/// then the socket peer address.
pub fn client_ip(parts: &Parts) -> String {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = header("x-real-ip") {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn parts_for(req: Request<Body>) -> Parts {
        let (parts, _) = req.into_parts();
        parts
    }

    #[test]
    fn test_forwarded_ip_takes_precedence() {
        let req = Request::builder()
            .uri("/me?verbose=1")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "198.51.100.1")
            .header("user-agent", "curl/8.0")
            .body(Body::empty())
            .unwrap();
        let ctx = RequestContext::from_parts(&parts_for(req), b"");

        assert_eq!(ctx.ip, "203.0.113.7");
        assert_eq!(ctx.path, "/me");
        assert_eq!(ctx.query.as_deref(), Some("verbose=1"));
        assert_eq!(ctx.client.browser, "curl");
    }

    #[test]
    fn test_json_body_parsed() {
        let req = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let ctx = RequestContext::from_parts(&parts_for(req), br#"{"a":1}"#);
        assert_eq!(ctx.body.as_ref().unwrap()["a"], 1);
    }

    #[test]
    fn test_non_json_body_ignored() {
        let req = Request::builder().uri("/x").body(Body::empty()).unwrap();
        let ctx = RequestContext::from_parts(&parts_for(req), b"not json");
        assert!(ctx.body.is_none());
    }
}
