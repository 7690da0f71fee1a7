use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub gate: GateConfig,
    pub risk: RiskConfig,
    pub security: SecurityConfig,
    pub oauth: OAuthConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Overall request deadline; bounds the worst case of the risk client
    /// retry loop (attempts x per-attempt timeout).
    pub request_deadline_secs: u64,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_days: i64,
    /// Paths exempt from the authentication stage, matched by exact string.
    pub exempt_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Allow requests whose country cannot be resolved from the client IP.
    /// On by default outside production to unblock local development.
    pub permit_unresolved_country: bool,
    /// Static IP-prefix to country mapping, entries like "203.0.113.=AU".
    pub country_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Base URL of the remote risk-assessment service. Empty disables the
    /// remote call entirely.
    pub base_url: String,
    pub api_key: String,
    /// Requests scoring above this are denied (0.0 - 1.0).
    pub threshold: f64,
    /// Policy when the service is unreachable after all retries:
    /// true = allow with a degraded marker, false = 503.
    pub fail_open: bool,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    /// Attempt latency above this is logged as a slow-dependency warning.
    pub slow_warn_ms: u128,
    pub whitelisted_ips: Vec<String>,
    pub skip_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Secret for CSRF token MACs.
    pub session_secret: String,
    pub cors_origins: Vec<String>,
    pub enable_rate_limiting: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_callback_url: String,
}

fn default_exempt_paths() -> Vec<String> {
    [
        "/",
        "/health",
        "/healthcheck",
        "/auth/login",
        "/auth/signup",
        "/refresh",
        // Logout authenticates with the refresh cookie, not the (possibly
        // already expired) access token
        "/logout",
        "/csrf-token",
        "/auth/google",
        "/auth/google/callback",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_risk_skip_paths() -> Vec<String> {
    [
        "/health",
        "/healthcheck",
        "/favicon.ico",
        "/auth/login",
        "/auth/signup",
        // Refresh bodies carry JWTs, whose base64 can false-positive the
        // injection patterns
        "/refresh",
        "/csrf-token",
        "/auth/google",
        "/auth/google/callback",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("SERVER_PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("SERVER_REQUEST_DEADLINE_SECS") {
            self.server.request_deadline_secs =
                v.parse().unwrap_or(self.server.request_deadline_secs);
        }
        if let Ok(v) = env::var("SERVER_MAX_BODY_BYTES") {
            self.server.max_body_bytes = v.parse().unwrap_or(self.server.max_body_bytes);
        }

        // Auth overrides
        if let Ok(v) = env::var("ACCESS_TOKEN_SECRET") {
            self.auth.access_token_secret = v;
        }
        if let Ok(v) = env::var("REFRESH_TOKEN_SECRET") {
            self.auth.refresh_token_secret = v;
        }
        if let Ok(v) = env::var("ACCESS_TOKEN_TTL_SECS") {
            self.auth.access_token_ttl_secs = v.parse().unwrap_or(self.auth.access_token_ttl_secs);
        }
        if let Ok(v) = env::var("REFRESH_TOKEN_TTL_DAYS") {
            self.auth.refresh_token_ttl_days =
                v.parse().unwrap_or(self.auth.refresh_token_ttl_days);
        }
        if let Ok(v) = env::var("AUTH_EXEMPT_PATHS") {
            self.auth.exempt_paths = split_list(&v);
        }

        // Gate overrides
        if let Ok(v) = env::var("GATE_PERMIT_UNRESOLVED_COUNTRY") {
            self.gate.permit_unresolved_country =
                v.parse().unwrap_or(self.gate.permit_unresolved_country);
        }
        if let Ok(v) = env::var("GATE_COUNTRY_PREFIXES") {
            self.gate.country_prefixes = split_list(&v);
        }

        // Risk overrides
        if let Ok(v) = env::var("RISK_SERVICE_URL") {
            self.risk.base_url = v;
        }
        if let Ok(v) = env::var("RISK_SERVICE_API_KEY") {
            self.risk.api_key = v;
        }
        if let Ok(v) = env::var("RISK_THRESHOLD") {
            self.risk.threshold = v.parse().unwrap_or(self.risk.threshold);
        }
        if let Ok(v) = env::var("RISK_FAIL_OPEN") {
            self.risk.fail_open = v.parse().unwrap_or(self.risk.fail_open);
        }
        if let Ok(v) = env::var("RISK_MAX_ATTEMPTS") {
            self.risk.max_attempts = v.parse().unwrap_or(self.risk.max_attempts);
        }
        if let Ok(v) = env::var("RISK_RETRY_DELAY_MS") {
            self.risk.retry_delay_ms = v.parse().unwrap_or(self.risk.retry_delay_ms);
        }
        if let Ok(v) = env::var("RISK_TIMEOUT_SECS") {
            self.risk.timeout_secs = v.parse().unwrap_or(self.risk.timeout_secs);
        }
        if let Ok(v) = env::var("RISK_WHITELISTED_IPS") {
            self.risk.whitelisted_ips = split_list(&v);
        }
        if let Ok(v) = env::var("RISK_SKIP_PATHS") {
            self.risk.skip_paths = split_list(&v);
        }

        // Security overrides
        if let Ok(v) = env::var("SESSION_SECRET") {
            self.security.session_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_RATE_LIMITING") {
            self.security.enable_rate_limiting =
                v.parse().unwrap_or(self.security.enable_rate_limiting);
        }
        if let Ok(v) = env::var("SECURITY_RATE_LIMIT_REQUESTS") {
            self.security.rate_limit_requests =
                v.parse().unwrap_or(self.security.rate_limit_requests);
        }
        if let Ok(v) = env::var("SECURITY_RATE_LIMIT_WINDOW_SECS") {
            self.security.rate_limit_window_secs =
                v.parse().unwrap_or(self.security.rate_limit_window_secs);
        }

        // OAuth overrides
        if let Ok(v) = env::var("GOOGLE_CLIENT_ID") {
            self.oauth.google_client_id = v;
        }
        if let Ok(v) = env::var("GOOGLE_CLIENT_SECRET") {
            self.oauth.google_client_secret = v;
        }
        if let Ok(v) = env::var("GOOGLE_CALLBACK_URL") {
            self.oauth.google_callback_url = v;
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 3000,
                request_deadline_secs: 20,
                max_body_bytes: 1024 * 1024, // 1MB
            },
            auth: AuthConfig {
                access_token_secret: "dev_access_token_secret".to_string(),
                refresh_token_secret: "dev_refresh_token_secret".to_string(),
                access_token_ttl_secs: 60,
                refresh_token_ttl_days: 365,
                exempt_paths: default_exempt_paths(),
            },
            gate: GateConfig {
                permit_unresolved_country: true,
                country_prefixes: Vec::new(),
            },
            risk: RiskConfig {
                base_url: String::new(),
                api_key: String::new(),
                threshold: 0.7,
                fail_open: true,
                max_attempts: 3,
                retry_delay_ms: 1000,
                timeout_secs: 5,
                slow_warn_ms: 1000,
                whitelisted_ips: Vec::new(),
                skip_paths: default_risk_skip_paths(),
            },
            security: SecurityConfig {
                session_secret: "dev_session_secret".to_string(),
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
                enable_rate_limiting: false,
                rate_limit_requests: 1000,
                rate_limit_window_secs: 60,
            },
            oauth: OAuthConfig {
                google_client_id: String::new(),
                google_client_secret: String::new(),
                google_callback_url: "http://localhost:3000/auth/google/callback".to_string(),
            },
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.gate.permit_unresolved_country = false;
        config.security.enable_rate_limiting = true;
        config.security.rate_limit_requests = 100;
        config.security.cors_origins = vec!["https://staging.example.com".to_string()];
        config
    }

    fn production() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Production;
        config.auth.access_token_secret = String::new();
        config.auth.refresh_token_secret = String::new();
        config.security.session_secret = String::new();
        config.gate.permit_unresolved_country = false;
        config.security.enable_rate_limiting = true;
        config.security.rate_limit_requests = 60;
        config.security.cors_origins = vec!["https://app.example.com".to_string()];
        config
    }

    /// Reject configurations that cannot run safely. Production refuses to
    /// start on empty secrets; the risk threshold must stay within 0.0-1.0.
    pub fn validate(&self) -> Result<(), String> {
        if self.environment == Environment::Production {
            if self.auth.access_token_secret.is_empty() {
                return Err("ACCESS_TOKEN_SECRET is required in production".to_string());
            }
            if self.auth.refresh_token_secret.is_empty() {
                return Err("REFRESH_TOKEN_SECRET is required in production".to_string());
            }
            if self.security.session_secret.is_empty() {
                return Err("SESSION_SECRET is required in production".to_string());
            }
        }
        if !(0.0..=1.0).contains(&self.risk.threshold) {
            return Err("RISK_THRESHOLD must be between 0 and 1".to_string());
        }
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup. Components that need
// per-test substitution (stages, token service) receive their settings by
// value instead of reading this.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

// Helper macros for common checks
#[macro_export]
macro_rules! is_development {
    () => {
        matches!(
            $crate::config::CONFIG.environment,
            $crate::config::Environment::Development
        )
    };
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!(
            $crate::config::CONFIG.environment,
            $crate::config::Environment::Production
        )
    };
}
