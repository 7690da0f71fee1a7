use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use super::models::{NewUser, RefreshTokenRecord, User};
use super::{StoreError, UserStore};

const USER_COLUMNS: &str = r#"
    id, username, email, password_hash, role,
    allowed_ips, blocked_ips,
    allowed_countries, blocked_countries,
    allowed_user_agents, blocked_user_agents,
    allowed_os, blocked_os,
    created_at
"#;

/// Postgres-backed user/session store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the backing tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                username TEXT NOT NULL UNIQUE,
                email TEXT,
                password_hash TEXT,
                role TEXT NOT NULL DEFAULT 'USER',
                allowed_ips TEXT[] NOT NULL DEFAULT '{}',
                blocked_ips TEXT[] NOT NULL DEFAULT '{}',
                allowed_countries TEXT[] NOT NULL DEFAULT '{}',
                blocked_countries TEXT[] NOT NULL DEFAULT '{}',
                allowed_user_agents TEXT[] NOT NULL DEFAULT '{}',
                blocked_user_agents TEXT[] NOT NULL DEFAULT '{}',
                allowed_os TEXT[] NOT NULL DEFAULT '{}',
                blocked_os TEXT[] NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS refresh_tokens (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        // 23505 = unique_violation
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::DuplicateUsername;
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_user(
        &self,
        new_user: NewUser,
    ) -> Result<(User, RefreshTokenRecord), StoreError> {
        let mut tx = self.pool.begin().await?;

        let insert_user = format!(
            r#"
            INSERT INTO users (username, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&insert_user)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&new_user.role)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_insert_error)?;

        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            INSERT INTO refresh_tokens (user_id)
            VALUES ($1)
            RETURNING id, user_id, created_at
            "#,
        )
        .bind(user.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((user, record))
    }

    async fn insert_refresh_token(&self, user_id: Uuid) -> Result<RefreshTokenRecord, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            INSERT INTO refresh_tokens (user_id)
            VALUES ($1)
            RETURNING id, user_id, created_at
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_refresh_token(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT id, user_id, created_at FROM refresh_tokens WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn delete_refresh_token(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
