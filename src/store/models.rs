use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated principal.
///
/// Each of the four device dimensions (IP, country, user-agent, OS) carries
/// an allow/deny list pair. An empty allow-list leaves the dimension open
/// apart from explicit deny entries; a non-empty allow-list restricts the
/// dimension to its entries (see the device gate for the full precedence
/// rule).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    /// None for OAuth-only accounts.
    pub password_hash: Option<String>,
    pub role: String,
    pub allowed_ips: Vec<String>,
    pub blocked_ips: Vec<String>,
    pub allowed_countries: Vec<String>,
    pub blocked_countries: Vec<String>,
    pub allowed_user_agents: Vec<String>,
    pub blocked_user_agents: Vec<String>,
    pub allowed_os: Vec<String>,
    pub blocked_os: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: String,
}

impl NewUser {
    pub fn local(username: impl Into<String>, password_hash: String) -> Self {
        Self {
            username: username.into(),
            email: None,
            password_hash: Some(password_hash),
            role: "USER".to_string(),
        }
    }

    pub fn oauth(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: Some(email.into()),
            password_hash: None,
            role: "USER".to_string(),
        }
    }
}

/// Persisted revocable half of the credential pair. The refresh JWT embeds
/// this record's id; deleting the row revokes the token.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}
