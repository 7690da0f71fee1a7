pub mod csrf;
pub mod observer;
pub mod rate_limit;
pub mod security;

pub use csrf::{csrf_middleware, CsrfGuard};
pub use observer::{observer_middleware, LoggingObserver, ObservedRequest, ResponseObserver};
pub use rate_limit::{rate_limit_middleware, IpRateLimiter};
pub use security::{security_middleware, CurrentUser};
