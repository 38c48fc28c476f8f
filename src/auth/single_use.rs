/// Single-use tokens for out-of-band flows
///
/// Values are random, not signed, so they survive a signing key rotation and
/// are invalidated simply by flipping `active`. Deactivation always happens
/// in the same store transaction as the action the token authorizes.

use chrono::Utc;
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::lifecycle::{random_hex, TokenManager};
use crate::domain::{NewToken, SingleUsePurpose, TokenRecord, User};
use crate::store::{TokenStore, UserStore};

const SINGLE_USE_BYTES: usize = 32;

impl TokenManager {
    /// Build (but do not store) a single-use token row
    ///
    /// Registration stores this together with the new user.
    pub fn new_single_use(&self, user_id: Uuid, purpose: SingleUsePurpose) -> NewToken {
        NewToken {
            id: Uuid::new_v4(),
            user_id,
            kind: purpose.kind(),
            value: random_hex(SINGLE_USE_BYTES),
            session_id: None,
            expires_at: Utc::now() + self.policy.single_use_ttl,
        }
    }

    /// Store a fresh single-use token and return its plaintext value
    pub async fn issue_single_use(
        &self,
        user_id: Uuid,
        purpose: SingleUsePurpose,
    ) -> Result<String, AuthError> {
        let token = self.new_single_use(user_id, purpose);
        let value = token.value.clone();
        self.tokens.insert(token).await?;

        tracing::info!(user_id = %user_id, kind = %purpose.kind(), "Single-use token issued");

        Ok(value)
    }

    /// Look up a single-use token without consuming it
    ///
    /// # Errors
    /// `TokenNotFound`, `TokenConsumed` or `TokenExpired`; all three reach
    /// clients as the same `INVALID_TOKEN`.
    pub async fn find_single_use(
        &self,
        value: &str,
        purpose: SingleUsePurpose,
    ) -> Result<TokenRecord, AuthError> {
        let record = self
            .tokens
            .find_by_value_and_kind(value, purpose.kind())
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if !record.active {
            return Err(AuthError::TokenConsumed);
        }
        if record.is_expired_at(Utc::now()) {
            return Err(AuthError::TokenExpired);
        }
        Ok(record)
    }

    /// Mark the owner's email verified and consume the token atomically
    pub async fn consume_email_verification(&self, value: &str) -> Result<User, AuthError> {
        let record = self
            .find_single_use(value, SingleUsePurpose::EmailVerification)
            .await?;

        let user = self
            .users
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if user.is_email_verified() {
            return Err(AuthError::AlreadyVerified);
        }

        self.users
            .verify_email_consuming(user.id, record.id)
            .await?;

        tracing::info!(user_id = %user.id, "Email verified");

        Ok(user)
    }

    /// Replace the owner's password hash and consume the token atomically,
    /// then end every session the user has
    pub async fn consume_password_reset(
        &self,
        value: &str,
        new_password_hash: &str,
    ) -> Result<User, AuthError> {
        let record = self
            .find_single_use(value, SingleUsePurpose::PasswordReset)
            .await?;

        let user = self
            .users
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        self.users
            .update_password_consuming(user.id, new_password_hash, record.id)
            .await?;

        tracing::info!(user_id = %user.id, "Password reset");

        self.revoke_all(user.id).await?;
        Ok(user)
    }
}
