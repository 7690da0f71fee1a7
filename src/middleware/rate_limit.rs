use std::num::NonZeroU32;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use crate::error::ApiError;
use crate::pipeline::context::client_ip;
use crate::AppState;

/// Keyed limiter, one token bucket per client IP.
pub type IpRateLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// `requests` per `window_secs`, replenished evenly across the window with
/// the full window available as burst.
pub fn build_limiter(requests: u32, window_secs: u64) -> IpRateLimiter {
    let requests = NonZeroU32::new(requests.max(1)).unwrap_or(NonZeroU32::MIN);
    let period = Duration::from_secs(window_secs.max(1)) / requests.get();
    let quota = Quota::with_period(period)
        .map(|q| q.allow_burst(requests))
        .unwrap_or_else(|| Quota::per_second(requests));
    RateLimiter::keyed(quota)
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limiter = match &state.limiter {
        Some(limiter) => limiter,
        None => return next.run(request).await,
    };

    let (parts, body) = request.into_parts();
    let ip = client_ip(&parts);
    let request = Request::from_parts(parts, body);

    if limiter.check_key(&ip).is_err() {
        tracing::warn!(ip = %ip, path = %request.uri().path(), "rate limit exceeded");
        return ApiError::too_many_requests("Too many requests, please try again later")
            .into_response();
    }

    next.run(request).await
}
