/// Token lifecycle
///
/// A session is one refresh-token lineage, identified by a server-chosen
/// session id that is embedded in both token bodies and in the stored row.
/// Access tokens are never stored. Refresh tokens are stored only as a
/// digest and are checked against the store on every use.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, RefreshClaims, SignedClaims};
use crate::auth::error::AuthError;
use crate::auth::jwt::TokenCodec;
use crate::auth::password::digest;
use crate::domain::{NewToken, TokenKind, User};
use crate::store::{TokenStore, UserStore};

const SESSION_ID_BYTES: usize = 12;
const TOKEN_ID_BYTES: usize = 32;

/// Token lifetimes, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecyclePolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub remember_me_multiplier: i32,
    pub single_use_ttl: Duration,
}

impl LifecyclePolicy {
    /// "Remember me" stretches the refresh lifetime; it never adds a claim.
    pub fn refresh_ttl_for(&self, remember_me: bool) -> Duration {
        if remember_me {
            self.refresh_ttl * self.remember_me_multiplier
        } else {
            self.refresh_ttl
        }
    }
}

/// Result of a successful login or forced rotation
///
/// `refresh_token` must only leave the process through the cookie channel.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub access_token: String,
    pub session_id: String,
    pub access_ttl: Duration,
    pub user: User,
}

/// A refresh token that passed every check
struct ValidatedRefresh {
    claims: SignedClaims<RefreshClaims>,
    user: User,
}

pub(crate) fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[derive(Clone)]
pub struct TokenManager {
    pub(crate) codec: Arc<TokenCodec>,
    pub(crate) tokens: Arc<dyn TokenStore>,
    pub(crate) users: Arc<dyn UserStore>,
    pub(crate) policy: LifecyclePolicy,
}

impl TokenManager {
    pub fn new(
        codec: Arc<TokenCodec>,
        tokens: Arc<dyn TokenStore>,
        users: Arc<dyn UserStore>,
        policy: LifecyclePolicy,
    ) -> Self {
        Self {
            codec,
            tokens,
            users,
            policy,
        }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Start a new session for an authenticated user
    ///
    /// Every refresh row the user already holds is deleted in the same
    /// transaction that stores the new one.
    ///
    /// # Errors
    /// `TokenIssue` if signing fails, `Infrastructure` if the store does
    pub async fn issue_session(
        &self,
        user: &User,
        remember_me: bool,
    ) -> Result<IssuedSession, AuthError> {
        let session_id = random_hex(SESSION_ID_BYTES);
        let refresh_ttl = self.policy.refresh_ttl_for(remember_me);

        let session = self.mint(user, session_id, refresh_ttl).await?;

        tracing::info!(
            user_id = %user.id,
            session_id = %session.session_id,
            remember_me = remember_me,
            "Session issued"
        );

        Ok(session)
    }

    /// Mint a new access token from a refresh token
    ///
    /// The refresh token is re-validated, not rotated, so this path never
    /// writes to the store.
    ///
    /// # Errors
    /// * `RefreshToken(..)` - signature, expiry or structure rejected
    /// * `InvalidRefreshToken` - claimed session id differs from the token's
    /// * `InvalidSession` - no live stored row for this token and session
    pub async fn refresh(
        &self,
        refresh_token: &str,
        claimed_session_id: &str,
    ) -> Result<RefreshedAccess, AuthError> {
        let validated = self.validate_refresh(refresh_token, claimed_session_id).await?;
        let session_id = validated.claims.body.sid;

        let access_token = self.codec.issue(
            AccessClaims::new(validated.user.id, &validated.user.email, &session_id),
            self.policy.access_ttl,
        )?;

        tracing::info!(
            user_id = %validated.user.id,
            session_id = %session_id,
            "Access token refreshed"
        );

        Ok(RefreshedAccess {
            access_token,
            session_id,
            access_ttl: self.policy.access_ttl,
            user: validated.user,
        })
    }

    /// Forced full rotation: validate like [`TokenManager::refresh`], then
    /// replace the stored refresh row with a new token on the same session.
    ///
    /// The new refresh token gets the same lifetime span as the one it replaces,
    /// so a remembered session stays remembered.
    pub async fn reissue(
        &self,
        refresh_token: &str,
        claimed_session_id: &str,
    ) -> Result<IssuedSession, AuthError> {
        let validated = self.validate_refresh(refresh_token, claimed_session_id).await?;
        let span = Duration::seconds(validated.claims.exp - validated.claims.iat);
        let refresh_ttl = if span > Duration::zero() {
            span
        } else {
            self.policy.refresh_ttl
        };

        let session = self
            .mint(&validated.user, validated.claims.body.sid, refresh_ttl)
            .await?;

        tracing::info!(
            user_id = %validated.user.id,
            session_id = %session.session_id,
            "Refresh token rotated"
        );

        Ok(session)
    }

    /// Delete every token row of one session. Absence is not an error.
    pub async fn revoke_session(&self, user_id: Uuid, session_id: &str) -> Result<u64, AuthError> {
        let removed = self.tokens.delete_by_session(user_id, session_id).await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            removed = removed,
            "Session revoked"
        );

        Ok(removed)
    }

    /// Delete every refresh row of the user, ending all of its sessions
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let removed = self
            .tokens
            .delete_by_user_and_kind(user_id, TokenKind::Refresh)
            .await?;

        tracing::info!(user_id = %user_id, removed = removed, "All sessions revoked");

        Ok(removed)
    }

    async fn mint(
        &self,
        user: &User,
        session_id: String,
        refresh_ttl: Duration,
    ) -> Result<IssuedSession, AuthError> {
        let access_token = self.codec.issue(
            AccessClaims::new(user.id, &user.email, &session_id),
            self.policy.access_ttl,
        )?;
        let refresh_token = self.codec.issue(
            RefreshClaims::new(user.id, &session_id, random_hex(TOKEN_ID_BYTES)),
            refresh_ttl,
        )?;

        let refresh_expires_at = Utc::now() + refresh_ttl;
        self.tokens
            .replace_refresh_token(NewToken {
                id: Uuid::new_v4(),
                user_id: user.id,
                kind: TokenKind::Refresh,
                value: digest(&refresh_token),
                session_id: Some(session_id.clone()),
                expires_at: refresh_expires_at,
            })
            .await?;

        Ok(IssuedSession {
            access_token,
            refresh_token,
            session_id,
            access_ttl: self.policy.access_ttl,
            refresh_ttl,
            refresh_expires_at,
        })
    }

    async fn validate_refresh(
        &self,
        refresh_token: &str,
        claimed_session_id: &str,
    ) -> Result<ValidatedRefresh, AuthError> {
        let claims = self
            .codec
            .verify::<RefreshClaims>(refresh_token)
            .map_err(AuthError::RefreshToken)?;

        if claims.body.sid != claimed_session_id {
            tracing::warn!(user_id = %claims.body.sub, "Refresh attempted with a mismatched session id");
            return Err(AuthError::InvalidRefreshToken);
        }

        let user_id = claims.body.user_id().map_err(AuthError::RefreshToken)?;

        let record = self
            .tokens
            .find_by_value_and_kind(&digest(refresh_token), TokenKind::Refresh)
            .await?
            .filter(|record| {
                record.user_id == user_id
                    && record.session_id.as_deref() == Some(claimed_session_id)
                    && record.is_usable()
            });

        if record.is_none() {
            tracing::warn!(
                user_id = %user_id,
                session_id = %claimed_session_id,
                "Refresh token has no live session"
            );
            return Err(AuthError::InvalidSession);
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidSession)?;

        Ok(ValidatedRefresh { claims, user })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::auth::error::TokenError;
    use crate::store::MemoryStore;

    fn refresh_rows(rows: &[crate::domain::TokenRecord]) -> usize {
        rows.iter().filter(|t| t.kind == TokenKind::Refresh).count()
    }

    #[tokio::test]
    async fn test_issue_session_stores_digest_only() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let user = user(&store, "ann").await;

        let session = manager.issue_session(&user, false).await.unwrap();

        assert_eq!(session.session_id.len(), SESSION_ID_BYTES * 2);
        let rows = store.tokens_for_user(user.id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, digest(&session.refresh_token));
        assert_ne!(rows[0].value, session.refresh_token);
        assert_eq!(rows[0].session_id.as_deref(), Some(session.session_id.as_str()));

        let access = manager.codec().verify::<AccessClaims>(&session.access_token).unwrap();
        assert_eq!(access.body.sid, session.session_id);
        assert_eq!(access.body.email, user.email);
    }

    #[tokio::test]
    async fn test_second_login_replaces_first() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let user = user(&store, "ann").await;

        let first = manager.issue_session(&user, false).await.unwrap();
        let second = manager.issue_session(&user, false).await.unwrap();

        assert_ne!(first.session_id, second.session_id);
        assert_eq!(refresh_rows(&store.tokens_for_user(user.id).await), 1);
        let stale = manager.refresh(&first.refresh_token, &first.session_id).await;
        assert!(matches!(stale, Err(AuthError::InvalidSession)));
    }

    #[tokio::test]
    async fn test_remember_me_extends_refresh_lifetime() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let user = user(&store, "ann").await;

        let session = manager.issue_session(&user, true).await.unwrap();

        assert_eq!(session.refresh_ttl, Duration::days(7) * 30);
        let claims = manager.codec().verify::<RefreshClaims>(&session.refresh_token).unwrap();
        assert_eq!(claims.exp - claims.iat, (Duration::days(7) * 30).num_seconds());
        let row = &store.tokens_for_user(user.id).await[0];
        assert!(row.expires_at > Utc::now() + Duration::days(200));
    }

    #[tokio::test]
    async fn test_refresh_keeps_session_and_store_untouched() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let user = user(&store, "ann").await;
        let session = manager.issue_session(&user, false).await.unwrap();
        let before = store.tokens_for_user(user.id).await;

        let refreshed = manager
            .refresh(&session.refresh_token, &session.session_id)
            .await
            .unwrap();

        assert_eq!(refreshed.session_id, session.session_id);
        assert_eq!(refreshed.user.id, user.id);
        assert_eq!(store.tokens_for_user(user.id).await, before);
    }

    #[tokio::test]
    async fn test_refresh_with_mismatched_session_id() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let user = user(&store, "ann").await;
        let session = manager.issue_session(&user, false).await.unwrap();

        let result = manager.refresh(&session.refresh_token, "not-my-session").await;
        assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let user = user(&store, "ann").await;
        let session = manager.issue_session(&user, false).await.unwrap();

        let result = manager.refresh(&session.access_token, &session.session_id).await;
        assert!(matches!(
            result,
            Err(AuthError::RefreshToken(TokenError::Malformed))
        ));
    }

    #[tokio::test]
    async fn test_refresh_after_revocation() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let user = user(&store, "ann").await;
        let session = manager.issue_session(&user, false).await.unwrap();

        assert_eq!(manager.revoke_session(user.id, &session.session_id).await.unwrap(), 1);
        assert_eq!(manager.revoke_session(user.id, &session.session_id).await.unwrap(), 0);

        let result = manager.refresh(&session.refresh_token, &session.session_id).await;
        assert!(matches!(result, Err(AuthError::InvalidSession)));
    }

    #[tokio::test]
    async fn test_refresh_for_soft_deleted_user() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let user = user(&store, "ann").await;
        let session = manager.issue_session(&user, false).await.unwrap();
        store.soft_delete(user.id).await.unwrap();

        let result = manager.refresh(&session.refresh_token, &session.session_id).await;
        assert!(matches!(result, Err(AuthError::InvalidSession)));
    }

    #[tokio::test]
    async fn test_reissue_rotates_on_same_session() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let user = user(&store, "ann").await;
        let session = manager.issue_session(&user, true).await.unwrap();

        let rotated = manager
            .reissue(&session.refresh_token, &session.session_id)
            .await
            .unwrap();

        assert_eq!(rotated.session_id, session.session_id);
        assert_ne!(rotated.refresh_token, session.refresh_token);
        assert_eq!(rotated.refresh_ttl, session.refresh_ttl);
        assert_eq!(refresh_rows(&store.tokens_for_user(user.id).await), 1);

        let old = manager.refresh(&session.refresh_token, &session.session_id).await;
        assert!(matches!(old, Err(AuthError::InvalidSession)));
        assert!(manager
            .refresh(&rotated.refresh_token, &rotated.session_id)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_revoke_all_leaves_single_use_tokens() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let user = user(&store, "ann").await;
        manager.issue_session(&user, false).await.unwrap();
        manager
            .issue_single_use(user.id, crate::domain::SingleUsePurpose::PasswordReset)
            .await
            .unwrap();

        assert_eq!(manager.revoke_all(user.id).await.unwrap(), 1);
        let rows = store.tokens_for_user(user.id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, TokenKind::PasswordReset);
    }

    #[tokio::test]
    async fn test_concurrent_logins_leave_one_refresh_row() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(&store);
        let user = user(&store, "ann").await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                let user = user.clone();
                tokio::spawn(async move { manager.issue_session(&user, false).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(refresh_rows(&store.tokens_for_user(user.id).await), 1);
    }
}
