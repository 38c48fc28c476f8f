/// Credential Hashing
///
/// Passwords are hashed with bcrypt (salted, tunable cost) on the blocking
/// thread pool. Refresh tokens are digested with unsalted SHA-256: their own
/// entropy makes salting unnecessary and the digest must be a stable lookup key.

use std::sync::Arc;

use bcrypt::{hash, verify};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use crate::auth::error::AuthError;

/// Plaintext hashed once to give unknown-user logins a comparable cost.
const TIMING_DUMMY_PASSWORD: &str = "sessionward-timing-equalizer";

#[derive(Clone, Debug)]
pub struct CredentialHasher {
    cost: u32,
    dummy_hash: Arc<OnceCell<String>>,
}

impl CredentialHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password with the configured cost factor
    ///
    /// # Errors
    /// Returns `HashFailure` if bcrypt or the blocking pool fails
    pub async fn hash_password(&self, plaintext: &str) -> Result<String, AuthError> {
        self.hash_password_with_cost(plaintext, self.cost).await
    }

    pub async fn hash_password_with_cost(
        &self,
        plaintext: &str,
        cost: u32,
    ) -> Result<String, AuthError> {
        let plaintext = plaintext.to_string();

        tokio::task::spawn_blocking(move || hash(plaintext, cost))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Password hashing task failed");
                AuthError::HashFailure
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "Password hashing failed");
                AuthError::HashFailure
            })
    }

    /// Compare a password against a stored hash
    ///
    /// Never fails: a malformed hash or a backend error is logged and
    /// reported as a mismatch.
    pub async fn compare_password(&self, plaintext: &str, stored_hash: &str) -> bool {
        let plaintext = plaintext.to_string();
        let stored_hash = stored_hash.to_string();

        match tokio::task::spawn_blocking(move || verify(plaintext, &stored_hash)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Password comparison failed");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Password comparison task failed");
                false
            }
        }
    }

    /// Spend one comparison's worth of work against a throwaway hash.
    ///
    /// Used when no stored hash exists so the response time does not reveal it.
    pub async fn compare_against_dummy(&self, plaintext: &str) {
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| self.hash_password(TIMING_DUMMY_PASSWORD))
            .await;

        if let Ok(dummy) = dummy {
            let _ = self.compare_password(plaintext, dummy).await;
        }
    }
}

/// Hex-encoded SHA-256 digest of a bearer secret
pub fn digest(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    // bcrypt's minimum cost keeps the tests fast
    fn hasher() -> CredentialHasher {
        CredentialHasher::new(4)
    }

    #[tokio::test]
    async fn test_hash_password() {
        let password = "ValidPassword123";
        let hash = hasher().hash_password(password).await.expect("Failed to hash password");

        assert_ne!(password, hash);
        assert!(hash.starts_with("$2"));
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let hasher = hasher();
        let first = hasher.hash_password("ValidPassword123").await.unwrap();
        let second = hasher.hash_password("ValidPassword123").await.unwrap();

        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_compare_password() {
        let hasher = hasher();
        let hash = hasher.hash_password("ValidPassword123").await.unwrap();

        assert!(hasher.compare_password("ValidPassword123", &hash).await);
        assert!(!hasher.compare_password("WrongPassword123", &hash).await);
        assert!(!hasher.compare_password("", &hash).await);
    }

    #[tokio::test]
    async fn test_compare_against_malformed_hash_fails_closed() {
        assert!(!hasher().compare_password("ValidPassword123", "not-a-bcrypt-hash").await);
    }

    #[tokio::test]
    async fn test_invalid_cost_is_a_hash_failure() {
        let result = hasher().hash_password_with_cost("ValidPassword123", 99).await;
        assert!(matches!(result, Err(AuthError::HashFailure)));
    }

    #[tokio::test]
    async fn test_dummy_comparison_completes() {
        let hasher = hasher();
        hasher.compare_against_dummy("anything").await;
        assert!(hasher.dummy_hash.get().is_some());
    }

    #[test]
    fn test_digest() {
        let first = digest("some.refresh.token");
        let second = digest("some.refresh.token");

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_ne!(first, "some.refresh.token");
        assert_ne!(first, digest("other.refresh.token"));
    }

    #[test]
    fn test_digest_known_vector() {
        assert_eq!(
            digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
