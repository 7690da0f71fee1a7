pub mod auth;
pub mod config;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod store;
pub mod ua;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::TokenService;
use crate::config::AppConfig;
use crate::geo::SharedGeoResolver;
use crate::middleware::csrf::{csrf_middleware, CsrfGuard};
use crate::middleware::observer::{observer_middleware, LoggingObserver, SharedObservers};
use crate::middleware::rate_limit::{build_limiter, rate_limit_middleware, IpRateLimiter};
use crate::middleware::security::security_middleware;
use crate::pipeline::{AuthStage, DeviceGateStage, RiskStage, SecurityPipeline};
use crate::store::UserStore;

/// Shared application state, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn UserStore>,
    pub tokens: TokenService,
    pub pipeline: Arc<SecurityPipeline>,
    pub csrf: CsrfGuard,
    pub limiter: Option<Arc<IpRateLimiter>>,
    pub observers: SharedObservers,
    pub http: reqwest::Client,
}

/// Wire the pipeline stages in their fixed order: authentication resolves
/// the principal, the device gate checks the principal's lists, the risk
/// stage scores what remains.
pub fn build_state(
    config: AppConfig,
    store: Arc<dyn UserStore>,
    geo: SharedGeoResolver,
) -> AppState {
    let tokens = TokenService::new(&config.auth);

    let pipeline = SecurityPipeline::new()
        .register(Box::new(AuthStage::new(
            tokens.clone(),
            store.clone(),
            config.auth.exempt_paths.clone(),
        )))
        .register(Box::new(DeviceGateStage::new(
            geo,
            config.gate.permit_unresolved_country,
        )))
        .register(Box::new(RiskStage::new(config.risk.clone())));

    let limiter = config.security.enable_rate_limiting.then(|| {
        Arc::new(build_limiter(
            config.security.rate_limit_requests,
            config.security.rate_limit_window_secs,
        ))
    });

    let observers: SharedObservers = Arc::new(vec![Box::new(LoggingObserver)]);

    AppState {
        csrf: CsrfGuard::new(&config.security.session_secret),
        tokens,
        store,
        pipeline: Arc::new(pipeline),
        limiter,
        observers,
        http: reqwest::Client::new(),
        config: Arc::new(config),
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-csrf-token"),
        ])
        .allow_credentials(true)
}

/// Build the router with the full middleware stack. Request flow, outermost
/// first: deadline, CORS, trace, response observer, rate limit, CSRF,
/// security pipeline, handler. The observer wraps every rejecting layer so
/// rate-limited, CSRF-failed, and pipeline-denied requests are logged too.
pub fn build_router(state: AppState) -> Router {
    let deadline = Duration::from_secs(state.config.server.request_deadline_secs);
    let cors = cors_layer(&state.config.security.cors_origins);

    Router::new()
        .route("/", get(handlers::health::health))
        .route("/health", get(handlers::health::health))
        .route("/healthcheck", get(handlers::health::health))
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/login", post(handlers::auth::login))
        .route("/refresh", post(handlers::auth::refresh))
        .route("/logout", get(handlers::auth::logout))
        .route("/csrf-token", post(handlers::csrf::issue_csrf_token))
        .route("/auth/google", get(handlers::oauth::google_redirect))
        .route("/auth/google/callback", get(handlers::oauth::google_callback))
        .route("/me", get(handlers::me::me))
        .layer(from_fn_with_state(state.clone(), security_middleware))
        .layer(from_fn_with_state(state.clone(), csrf_middleware))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(from_fn_with_state(state.clone(), observer_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::new(deadline))
        .with_state(state)
}
