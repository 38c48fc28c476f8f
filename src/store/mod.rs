/// Persistence collaborators
///
/// Every mutation is scoped by an explicit user id (plus session, kind or
/// token id). Multi-statement operations are single methods so each backend
/// can run them inside one transaction.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{NewToken, NewUser, TokenKind, TokenRecord, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint violation; carries the offending field
    #[error("duplicate {0}")]
    Conflict(String),
    /// Conditional deactivation matched no active row
    #[error("token already consumed")]
    TokenAlreadyConsumed,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                let field = match db_err.constraint() {
                    Some(c) if c.contains("username") => "username",
                    Some(c) if c.contains("email") => "email",
                    _ => "record",
                };
                StoreError::Conflict(field.to_string())
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Query(err.to_string()),
        }
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: NewToken) -> Result<TokenRecord, StoreError>;

    /// Atomically delete every refresh row of `token.user_id`, then insert `token`.
    async fn replace_refresh_token(&self, token: NewToken) -> Result<TokenRecord, StoreError>;

    async fn find_by_value_and_kind(
        &self,
        value: &str,
        kind: TokenKind,
    ) -> Result<Option<TokenRecord>, StoreError>;

    /// Returns the number of deleted rows; zero is not an error.
    async fn delete_by_session(&self, user_id: Uuid, session_id: &str) -> Result<u64, StoreError>;

    async fn delete_by_user_and_kind(&self, user_id: Uuid, kind: TokenKind)
        -> Result<u64, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user and, in the same transaction, its verification token.
    async fn create_user(
        &self,
        user: NewUser,
        verification: Option<NewToken>,
    ) -> Result<User, StoreError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn record_login(&self, user_id: Uuid) -> Result<(), StoreError>;

    /// Stamp `email_verified_at` and deactivate `token_id` together.
    ///
    /// Fails with `TokenAlreadyConsumed` and changes nothing if the token is
    /// no longer active.
    async fn verify_email_consuming(&self, user_id: Uuid, token_id: Uuid) -> Result<(), StoreError>;

    /// Replace the password hash and deactivate `token_id` together.
    async fn update_password_consuming(
        &self,
        user_id: Uuid,
        password_hash: &str,
        token_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn soft_delete(&self, user_id: Uuid) -> Result<(), StoreError>;
}
