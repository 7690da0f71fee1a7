use async_trait::async_trait;
use std::sync::Arc;

use crate::auth::TokenService;
use crate::error::ApiError;
use crate::pipeline::{Outcome, RequestContext, SecurityStage};
use crate::store::UserStore;

/// Bearer-token authentication stage.
///
/// Exempt paths (health checks, login, signup, token refresh, CSRF issue)
/// skip the stage entirely, matched by exact path string before the verifier
/// is consulted. Everything else needs a validly signed, unexpired access
/// token whose subject still resolves to a live principal.
pub struct AuthStage {
    tokens: TokenService,
    store: Arc<dyn UserStore>,
    exempt_paths: Vec<String>,
}

impl AuthStage {
    pub fn new(tokens: TokenService, store: Arc<dyn UserStore>, exempt_paths: Vec<String>) -> Self {
        Self {
            tokens,
            store,
            exempt_paths,
        }
    }

    fn bearer_token<'a>(&self, ctx: &'a RequestContext) -> Option<&'a str> {
        let header = ctx.headers.get("authorization")?;
        let token = header.strip_prefix("Bearer ")?.trim();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }
}

#[async_trait]
impl SecurityStage for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn evaluate(&self, ctx: &mut RequestContext) -> Outcome {
        if self.exempt_paths.iter().any(|p| p == &ctx.path) {
            return Outcome::Allow;
        }

        let token = match self.bearer_token(ctx) {
            Some(token) => token,
            None => {
                return Outcome::deny(
                    "missing bearer token",
                    ApiError::unauthorized("You must be logged in to access this resource"),
                );
            }
        };

        let claims = match self.tokens.verify_access_token(token) {
            Ok(claims) => claims,
            Err(e) => {
                return Outcome::deny(
                    format!("token rejected: {e}"),
                    ApiError::unauthorized("Invalid or expired token"),
                );
            }
        };

        // The principal may have been deleted after the token was issued;
        // that is an authentication failure, not a server error.
        match self.store.find_user_by_id(claims.sub).await {
            Ok(Some(user)) => {
                tracing::debug!(principal = %user.id, username = %user.username, "token authenticated");
                ctx.principal = Some(user);
                Outcome::Allow
            }
            Ok(None) => Outcome::deny(
                format!("principal {} no longer exists", claims.sub),
                ApiError::unauthorized("Invalid or expired token"),
            ),
            Err(e) => Outcome::Error { error: e.into() },
        }
    }
}
