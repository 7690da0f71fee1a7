use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::models::{NewUser, RefreshTokenRecord, User};
use super::{StoreError, UserStore};

/// In-memory store with the same semantics as [`super::PgStore`]. Used by
/// the integration tests so the full router can be exercised without a
/// running database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a stored user wholesale, e.g. to set allow/deny lists in tests.
    pub fn update_user(&self, user: User) {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.users.insert(user.id, user);
    }

    /// Number of persisted refresh-token records for a principal.
    pub fn refresh_token_count(&self, user_id: Uuid) -> usize {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner
            .refresh_tokens
            .values()
            .filter(|r| r.user_id == user_id)
            .count()
    }
}

fn blank_user(new_user: NewUser) -> User {
    User {
        id: Uuid::new_v4(),
        username: new_user.username,
        email: new_user.email,
        password_hash: new_user.password_hash,
        role: new_user.role,
        allowed_ips: Vec::new(),
        blocked_ips: Vec::new(),
        allowed_countries: Vec::new(),
        blocked_countries: Vec::new(),
        allowed_user_agents: Vec::new(),
        blocked_user_agents: Vec::new(),
        allowed_os: Vec::new(),
        blocked_os: Vec::new(),
        created_at: Utc::now(),
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_user(
        &self,
        new_user: NewUser,
    ) -> Result<(User, RefreshTokenRecord), StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        if inner.users.values().any(|u| u.username == new_user.username) {
            return Err(StoreError::DuplicateUsername);
        }

        let user = blank_user(new_user);
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id: user.id,
            created_at: Utc::now(),
        };
        inner.users.insert(user.id, user.clone());
        inner.refresh_tokens.insert(record.id, record.clone());
        Ok((user, record))
    }

    async fn insert_refresh_token(&self, user_id: Uuid) -> Result<RefreshTokenRecord, StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id,
            created_at: Utc::now(),
        };
        inner.refresh_tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_refresh_token(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.refresh_tokens.get(&id).cloned())
    }

    async fn delete_refresh_token(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        Ok(inner.refresh_tokens.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_user_is_atomic_with_initial_token() {
        let store = MemoryStore::new();
        let (user, record) = store
            .create_user(NewUser::local("alice", "hash".to_string()))
            .await
            .unwrap();
        assert_eq!(record.user_id, user.id);
        assert_eq!(store.refresh_token_count(user.id), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = MemoryStore::new();
        store
            .create_user(NewUser::local("alice", "hash".to_string()))
            .await
            .unwrap();
        let err = store
            .create_user(NewUser::local("alice", "hash2".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername));
    }

    #[tokio::test]
    async fn test_deleted_refresh_token_is_gone() {
        let store = MemoryStore::new();
        let (user, record) = store
            .create_user(NewUser::local("alice", "hash".to_string()))
            .await
            .unwrap();
        assert!(store.delete_refresh_token(record.id).await.unwrap());
        assert!(store.find_refresh_token(record.id).await.unwrap().is_none());
        assert_eq!(store.refresh_token_count(user.id), 0);
    }
}
