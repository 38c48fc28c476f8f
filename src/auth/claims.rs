/// JWT Claims structures
///
/// `SignedClaims<T>` carries the registered claims stamped by the codec
/// (RFC 7519 `iss`, `iat`, `exp`) around a token-specific body.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::error::TokenError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SignedClaims<T> {
    #[serde(flatten)]
    pub body: T,
    /// Issuer
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Body of a short-lived access token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccessClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub email: String,
    /// Session identifier
    pub sid: String,
}

/// Body of a refresh token
///
/// `jti` is 256 bits of randomness, which is what makes the unsalted
/// storage digest safe.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RefreshClaims {
    pub sub: String,
    pub sid: String,
    pub jti: String,
}

impl AccessClaims {
    pub fn new(user_id: Uuid, email: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            sub: user_id.to_string(),
            email: email.into(),
            sid: session_id.into(),
        }
    }

    /// A subject that is not a UUID can only come from a foreign issuer
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }
}

impl RefreshClaims {
    pub fn new(user_id: Uuid, session_id: impl Into<String>, jti: impl Into<String>) -> Self {
        Self {
            sub: user_id.to_string(),
            sid: session_id.into(),
            jti: jti.into(),
        }
    }

    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_claims_creation() {
        let user_id = Uuid::new_v4();
        let claims = AccessClaims::new(user_id, "test@example.com", "abc123");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.sid, "abc123");
        assert_eq!(claims.user_id().unwrap(), user_id);
    }

    #[test]
    fn test_invalid_user_id() {
        let mut claims = RefreshClaims::new(Uuid::new_v4(), "sid", "jti");
        claims.sub = "invalid-uuid".to_string();

        assert_eq!(claims.user_id(), Err(TokenError::Malformed));
    }

    #[test]
    fn test_signed_claims_are_flat_on_the_wire() {
        let signed = SignedClaims {
            body: RefreshClaims::new(Uuid::new_v4(), "sid", "jti"),
            iss: "test".to_string(),
            iat: 1,
            exp: 2,
        };
        let json = serde_json::to_value(&signed).unwrap();

        assert_eq!(json["sid"], "sid");
        assert_eq!(json["exp"], 2);
        assert!(json.get("body").is_none());
    }

    #[test]
    fn test_refresh_body_does_not_parse_as_access_body() {
        let json = serde_json::to_value(RefreshClaims::new(Uuid::new_v4(), "sid", "jti")).unwrap();
        assert!(serde_json::from_value::<AccessClaims>(json).is_err());
    }
}
