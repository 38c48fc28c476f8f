/// Postgres-backed stores
///
/// Multi-statement operations run in a single transaction. Refresh-token
/// replacement locks the owning user row first, which serializes concurrent
/// logins of the same user without touching other users.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreError, TokenStore, UserStore};
use crate::domain::{Lifecycle, NewToken, NewUser, TokenKind, TokenRecord, User};

const TOKEN_COLUMNS: &str =
    "id, user_id, kind, value, session_id, active, expires_at, created_at, updated_at";

const USER_COLUMNS: &str = "id, username, email, password_hash, role, first_name, middle_name, \
     last_name, email_verified_at, phone_verified_at, last_logged_in_at, deleted_at, \
     created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    value: String,
    session_id: Option<String>,
    active: bool,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TokenRow> for TokenRecord {
    type Error = StoreError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(TokenRecord {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind.parse().map_err(StoreError::Query)?,
            value: row.value,
            session_id: row.session_id,
            active: row.active,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: Option<String>,
    role: String,
    first_name: String,
    middle_name: Option<String>,
    last_name: Option<String>,
    email_verified_at: Option<DateTime<Utc>>,
    phone_verified_at: Option<DateTime<Utc>>,
    last_logged_in_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse().map_err(StoreError::Query)?,
            first_name: row.first_name,
            middle_name: row.middle_name,
            last_name: row.last_name,
            email_verified_at: row.email_verified_at,
            phone_verified_at: row.phone_verified_at,
            last_logged_in_at: row.last_logged_in_at,
            lifecycle: Lifecycle::from_deleted_at(row.deleted_at),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn insert_token(conn: &mut PgConnection, token: &NewToken) -> Result<TokenRecord, StoreError> {
    let row = sqlx::query_as::<_, TokenRow>(&format!(
        r#"
        INSERT INTO tokens (id, user_id, kind, value, session_id, active, expires_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, true, $6, $7, $7)
        RETURNING {}
        "#,
        TOKEN_COLUMNS
    ))
    .bind(token.id)
    .bind(token.user_id)
    .bind(token.kind.as_str())
    .bind(&token.value)
    .bind(&token.session_id)
    .bind(token.expires_at)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;

    row.try_into()
}

/// Conditional deactivation; zero affected rows means someone consumed it first
async fn consume_token(conn: &mut PgConnection, user_id: Uuid, token_id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE tokens
        SET active = false, updated_at = $1
        WHERE id = $2 AND user_id = $3 AND active = true
        "#,
    )
    .bind(Utc::now())
    .bind(token_id)
    .bind(user_id)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::TokenAlreadyConsumed);
    }
    Ok(())
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert(&self, token: NewToken) -> Result<TokenRecord, StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_token(&mut conn, &token).await
    }

    async fn replace_refresh_token(&self, token: NewToken) -> Result<TokenRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(token.user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM tokens WHERE user_id = $1 AND kind = $2")
            .bind(token.user_id)
            .bind(TokenKind::Refresh.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let record = insert_token(&mut tx, &token).await?;
        tx.commit().await?;

        tracing::debug!(user_id = %token.user_id, replaced = deleted, "Refresh token row replaced");
        Ok(record)
    }

    async fn find_by_value_and_kind(
        &self,
        value: &str,
        kind: TokenKind,
    ) -> Result<Option<TokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, TokenRow>(&format!(
            "SELECT {} FROM tokens WHERE value = $1 AND kind = $2",
            TOKEN_COLUMNS
        ))
        .bind(value)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TokenRecord::try_from).transpose()
    }

    async fn delete_by_session(&self, user_id: Uuid, session_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tokens WHERE user_id = $1 AND session_id = $2")
            .bind(user_id)
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_by_user_and_kind(
        &self,
        user_id: Uuid,
        kind: TokenKind,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tokens WHERE user_id = $1 AND kind = $2")
            .bind(user_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(
        &self,
        user: NewUser,
        verification: Option<NewToken>,
    ) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, first_name, middle_name, last_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.first_name)
        .bind(&user.middle_name)
        .bind(&user.last_name)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(token) = verification {
            insert_token(&mut tx, &token).await?;
        }

        tx.commit().await?;
        row.try_into()
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn record_login(&self, user_id: Uuid) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE users SET last_logged_in_at = $1, updated_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn verify_email_consuming(&self, user_id: Uuid, token_id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        consume_token(&mut tx, user_id, token_id).await?;

        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE users SET email_verified_at = $1, updated_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            // dropping the transaction rolls back the deactivation
            return Err(StoreError::Query(format!("unknown user {}", user_id)));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_password_consuming(
        &self,
        user_id: Uuid,
        password_hash: &str,
        token_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        consume_token(&mut tx, user_id, token_id).await?;

        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3 AND deleted_at IS NULL",
        )
        .bind(password_hash)
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::Query(format!("unknown user {}", user_id)));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn soft_delete(&self, user_id: Uuid) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE users SET deleted_at = $1, updated_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
