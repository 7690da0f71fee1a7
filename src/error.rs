// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

/// HTTP API error with appropriate status codes and client-friendly messages
///
/// Every pipeline stage and handler converts its failure into one of these
/// kinds before it crosses into the response layer; raw internal error values
/// are never serialized to the client.
#[derive(Debug, Clone)]
pub enum ApiError {
    // 400 Bad Request (malformed input, incorrect password)
    BadRequest(String),

    // 401 Unauthorized (missing/invalid/expired token)
    Unauthorized(String),

    // 403 Forbidden (device/origin/CSRF/risk denial)
    // `details` carries client-surfaceable context such as the risk score
    // and configured threshold for risk rejections.
    Forbidden {
        message: String,
        details: Option<Value>,
    },

    // 404 Not Found (unknown user)
    NotFound(String),

    // 409 Conflict (duplicate username); carries a stable machine code
    Conflict {
        message: String,
        code: &'static str,
    },

    // 429 Too Many Requests
    TooManyRequests(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable (risk service unreachable under fail-closed policy)
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden { message, .. } => message,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict { message, .. } => message,
            ApiError::TooManyRequests(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden { .. } => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict { code, .. } => code,
            ApiError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    ///
    /// Internal error messages are replaced with a generic message in
    /// production so stack traces and internal state never reach clients.
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::InternalServerError(msg) => {
                if crate::is_production!() {
                    json!({
                        "error": true,
                        "message": "An error occurred while processing your request",
                        "code": self.error_code()
                    })
                } else {
                    json!({
                        "error": true,
                        "message": msg,
                        "code": self.error_code()
                    })
                }
            }
            ApiError::Forbidden { message, details } => {
                let mut body = json!({
                    "error": true,
                    "message": message,
                    "code": self.error_code()
                });
                if let Some(details) = details {
                    body["details"] = details.clone();
                }
                body
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            message: message.into(),
            details: None,
        }
    }

    pub fn forbidden_with_details(message: impl Into<String>, details: Value) -> Self {
        ApiError::Forbidden {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict {
            message: message.into(),
            code: "CONFLICT",
        }
    }

    pub fn username_exists() -> Self {
        ApiError::Conflict {
            message: "Username already exists".to_string(),
            code: "USERNAME_EXISTS",
        }
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        ApiError::TooManyRequests(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<crate::store::StoreError> for ApiError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::DuplicateUsername => ApiError::username_exists(),
            crate::store::StoreError::Database(e) => {
                // Don't expose internal SQL errors to clients
                tracing::error!("Store query error: {}", e);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<crate::auth::TokenError> for ApiError {
    fn from(err: crate::auth::TokenError) -> Self {
        match err {
            crate::auth::TokenError::Invalid | crate::auth::TokenError::Expired => {
                ApiError::unauthorized("Invalid or expired token")
            }
            crate::auth::TokenError::Generation(msg) => {
                tracing::error!("Token generation error: {}", msg);
                ApiError::internal_server_error("Failed to issue token")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
