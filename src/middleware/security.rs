use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::pipeline::RequestContext;
use crate::store::User;
use crate::AppState;

/// Authenticated principal injected by the security middleware, available to
/// handlers as an extractor.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CurrentUser>().cloned().ok_or_else(|| {
            ApiError::unauthorized("You must be logged in to access this resource")
        })
    }
}

/// Runs the security pipeline for every request.
///
/// The body is buffered up front (bounded by `max_body_bytes`) so the risk
/// stage can inspect it, then handed back to the inner router untouched. On a
/// pipeline pass the resolved principal and risk verdict are placed in the
/// request extensions for handlers. Both pass and rejection responses carry
/// whatever the pipeline resolved in their response extensions, so the outer
/// observer can log denied requests with the same detail.
pub async fn security_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, state.config.server.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return ApiError::bad_request("Request body too large or unreadable").into_response();
        }
    };

    let mut ctx = RequestContext::from_parts(&parts, &bytes);
    if let Err(err) = state.pipeline.evaluate(&mut ctx).await {
        let mut response = err.into_response();
        if let Some(user) = ctx.principal {
            response.extensions_mut().insert(CurrentUser(user));
        }
        if let Some(risk) = ctx.risk {
            response.extensions_mut().insert(risk);
        }
        return response;
    }

    let principal = ctx.principal.map(CurrentUser);
    let risk = ctx.risk;

    let mut request = Request::from_parts(parts, Body::from(bytes));
    if let Some(user) = principal.clone() {
        request.extensions_mut().insert(user);
    }
    if let Some(risk) = risk.clone() {
        request.extensions_mut().insert(risk);
    }

    let mut response = next.run(request).await;
    if let Some(user) = principal {
        response.extensions_mut().insert(user);
    }
    if let Some(risk) = risk {
        response.extensions_mut().insert(risk);
    }
    response
}
