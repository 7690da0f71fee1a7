use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use models::{NewUser, RefreshTokenRecord, User};
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username already exists")]
    DuplicateUsername,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Relational user/session store, consulted by the pipeline and the auth
/// handlers. The production implementation is [`PgStore`]; tests substitute
/// [`MemoryStore`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Create a user together with their initial refresh-token record.
    /// Both succeed or both fail.
    async fn create_user(&self, new_user: NewUser) -> Result<(User, RefreshTokenRecord), StoreError>;

    /// Insert one refresh-token record; one row per successful login.
    async fn insert_refresh_token(&self, user_id: Uuid) -> Result<RefreshTokenRecord, StoreError>;

    /// A refresh token is valid iff its backing record still exists.
    async fn find_refresh_token(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Revoke a refresh token by deleting its record. Returns whether a
    /// record was deleted.
    async fn delete_refresh_token(&self, id: Uuid) -> Result<bool, StoreError>;
}
