/// In-process store for tests and local development
///
/// All state sits behind one async mutex and every trait call holds it for
/// its whole body, so each call is atomic with respect to the others.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{StoreError, TokenStore, UserStore};
use crate::domain::{Lifecycle, NewToken, NewUser, TokenKind, TokenRecord, User};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    tokens: HashMap<Uuid, TokenRecord>,
}

impl State {
    fn active_user_mut(&mut self, user_id: Uuid) -> Option<&mut User> {
        self.users
            .get_mut(&user_id)
            .filter(|user| user.lifecycle.is_active())
    }

    fn insert_token(&mut self, token: NewToken) -> Result<TokenRecord, StoreError> {
        // Mirrors the foreign key on tokens.user_id
        if !self.users.contains_key(&token.user_id) {
            return Err(StoreError::Query(format!("unknown user {}", token.user_id)));
        }
        let record = token.into_record(Utc::now());
        self.tokens.insert(record.id, record.clone());
        Ok(record)
    }

    /// The token must be live and owned by `user_id`
    fn ensure_active(&self, user_id: Uuid, token_id: Uuid) -> Result<(), StoreError> {
        match self.tokens.get(&token_id) {
            Some(token) if token.active && token.user_id == user_id => Ok(()),
            _ => Err(StoreError::TokenAlreadyConsumed),
        }
    }

    fn delete_where(&mut self, predicate: impl Fn(&TokenRecord) -> bool) -> u64 {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| !predicate(token));
        (before - self.tokens.len()) as u64
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every token row owned by `user_id`
    pub async fn tokens_for_user(&self, user_id: Uuid) -> Vec<TokenRecord> {
        let state = self.state.lock().await;
        state
            .tokens
            .values()
            .filter(|token| token.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Hard delete, standing in for the cascade an operator-level purge triggers
    pub async fn purge_user(&self, user_id: Uuid) {
        let mut state = self.state.lock().await;
        state.users.remove(&user_id);
        state.delete_where(|token| token.user_id == user_id);
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: NewToken) -> Result<TokenRecord, StoreError> {
        self.state.lock().await.insert_token(token)
    }

    async fn replace_refresh_token(&self, token: NewToken) -> Result<TokenRecord, StoreError> {
        let mut state = self.state.lock().await;
        let user_id = token.user_id;
        state.delete_where(|t| t.user_id == user_id && t.kind == TokenKind::Refresh);
        state.insert_token(token)
    }

    async fn find_by_value_and_kind(
        &self,
        value: &str,
        kind: TokenKind,
    ) -> Result<Option<TokenRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .tokens
            .values()
            .find(|token| token.kind == kind && token.value == value)
            .cloned())
    }

    async fn delete_by_session(&self, user_id: Uuid, session_id: &str) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.delete_where(|token| {
            token.user_id == user_id && token.session_id.as_deref() == Some(session_id)
        }))
    }

    async fn delete_by_user_and_kind(
        &self,
        user_id: Uuid,
        kind: TokenKind,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.delete_where(|token| token.user_id == user_id && token.kind == kind))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(
        &self,
        user: NewUser,
        verification: Option<NewToken>,
    ) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;

        // Uniqueness covers soft-deleted rows too, like the database index
        if state.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("username".to_string()));
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email".to_string()));
        }

        let user = user.into_user(Utc::now());
        state.users.insert(user.id, user.clone());

        if let Some(token) = verification {
            if let Err(e) = state.insert_token(token) {
                state.users.remove(&user.id);
                return Err(e);
            }
        }

        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .get(&user_id)
            .filter(|user| user.lifecycle.is_active())
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|user| user.email == email && user.lifecycle.is_active())
            .cloned())
    }

    async fn record_login(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.active_user_mut(user_id) {
            let now = Utc::now();
            user.last_logged_in_at = Some(now);
            user.updated_at = now;
        }
        Ok(())
    }

    async fn verify_email_consuming(&self, user_id: Uuid, token_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.ensure_active(user_id, token_id)?;
        if state.active_user_mut(user_id).is_none() {
            return Err(StoreError::Query(format!("unknown user {}", user_id)));
        }

        let now = Utc::now();
        if let Some(user) = state.active_user_mut(user_id) {
            user.email_verified_at = Some(now);
            user.updated_at = now;
        }
        if let Some(token) = state.tokens.get_mut(&token_id) {
            token.active = false;
            token.updated_at = now;
        }
        Ok(())
    }

    async fn update_password_consuming(
        &self,
        user_id: Uuid,
        password_hash: &str,
        token_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.ensure_active(user_id, token_id)?;
        if state.active_user_mut(user_id).is_none() {
            return Err(StoreError::Query(format!("unknown user {}", user_id)));
        }

        let now = Utc::now();
        if let Some(user) = state.active_user_mut(user_id) {
            user.password_hash = Some(password_hash.to_string());
            user.updated_at = now;
        }
        if let Some(token) = state.tokens.get_mut(&token_id) {
            token.active = false;
            token.updated_at = now;
        }
        Ok(())
    }

    async fn soft_delete(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.active_user_mut(user_id) {
            let now = Utc::now();
            user.lifecycle = Lifecycle::Deleted { at: now };
            user.updated_at = now;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use chrono::Duration;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: Some("hash".to_string()),
            role: Role::User,
            first_name: "Test".to_string(),
            middle_name: None,
            last_name: None,
        }
    }

    fn token(user_id: Uuid, kind: TokenKind, session_id: Option<&str>) -> NewToken {
        NewToken {
            id: Uuid::new_v4(),
            user_id,
            kind,
            value: Uuid::new_v4().to_string(),
            session_id: session_id.map(String::from),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicates() {
        let store = MemoryStore::new();
        store.create_user(new_user("ann", "ann@example.com"), None).await.unwrap();

        let dup_name = store.create_user(new_user("ann", "other@example.com"), None).await;
        assert!(matches!(dup_name, Err(StoreError::Conflict(f)) if f == "username"));

        let dup_email = store.create_user(new_user("other", "ann@example.com"), None).await;
        assert!(matches!(dup_email, Err(StoreError::Conflict(f)) if f == "email"));
    }

    #[tokio::test]
    async fn test_replace_refresh_token_keeps_single_row() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("ann", "ann@example.com"), None).await.unwrap();

        store.replace_refresh_token(token(user.id, TokenKind::Refresh, Some("s1"))).await.unwrap();
        store.replace_refresh_token(token(user.id, TokenKind::Refresh, Some("s2"))).await.unwrap();
        store.insert(token(user.id, TokenKind::PasswordReset, None)).await.unwrap();

        let rows = store.tokens_for_user(user.id).await;
        let refresh: Vec<_> = rows.iter().filter(|t| t.kind == TokenKind::Refresh).collect();
        assert_eq!(refresh.len(), 1);
        assert_eq!(refresh[0].session_id.as_deref(), Some("s2"));
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_by_session_is_scoped_to_user() {
        let store = MemoryStore::new();
        let ann = store.create_user(new_user("ann", "ann@example.com"), None).await.unwrap();
        let bob = store.create_user(new_user("bob", "bob@example.com"), None).await.unwrap();
        store.insert(token(ann.id, TokenKind::Refresh, Some("shared"))).await.unwrap();
        store.insert(token(bob.id, TokenKind::Refresh, Some("shared"))).await.unwrap();

        assert_eq!(store.delete_by_session(ann.id, "shared").await.unwrap(), 1);
        assert_eq!(store.delete_by_session(ann.id, "shared").await.unwrap(), 0);
        assert_eq!(store.tokens_for_user(bob.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_consuming_twice_fails_without_side_effects() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("ann", "ann@example.com"), None).await.unwrap();
        let reset = store.insert(token(user.id, TokenKind::PasswordReset, None)).await.unwrap();

        store.update_password_consuming(user.id, "new-hash", reset.id).await.unwrap();
        let second = store.update_password_consuming(user.id, "other-hash", reset.id).await;

        assert!(matches!(second, Err(StoreError::TokenAlreadyConsumed)));
        let user = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.password_hash.as_deref(), Some("new-hash"));
    }

    #[tokio::test]
    async fn test_consuming_is_scoped_to_token_owner() {
        let store = MemoryStore::new();
        let ann = store.create_user(new_user("ann", "ann@example.com"), None).await.unwrap();
        let bob = store.create_user(new_user("bob", "bob@example.com"), None).await.unwrap();
        let anns = store.insert(token(ann.id, TokenKind::EmailVerification, None)).await.unwrap();
        let reset = store.insert(token(ann.id, TokenKind::PasswordReset, None)).await.unwrap();

        let verify = store.verify_email_consuming(bob.id, anns.id).await;
        let update = store.update_password_consuming(bob.id, "stolen", reset.id).await;

        assert!(matches!(verify, Err(StoreError::TokenAlreadyConsumed)));
        assert!(matches!(update, Err(StoreError::TokenAlreadyConsumed)));
        let bob = store.find_by_id(bob.id).await.unwrap().unwrap();
        assert!(bob.email_verified_at.is_none());
        assert_ne!(bob.password_hash.as_deref(), Some("stolen"));
        assert!(store.tokens_for_user(ann.id).await.iter().all(|t| t.active));
    }

    #[tokio::test]
    async fn test_soft_deleted_users_are_hidden() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("ann", "ann@example.com"), None).await.unwrap();
        store.soft_delete(user.id).await.unwrap();

        assert!(store.find_by_id(user.id).await.unwrap().is_none());
        assert!(store.find_by_email("ann@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_cascades_to_tokens() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("ann", "ann@example.com"), None).await.unwrap();
        store.insert(token(user.id, TokenKind::EmailVerification, None)).await.unwrap();

        store.purge_user(user.id).await;
        assert!(store.tokens_for_user(user.id).await.is_empty());
    }
}
