/// Authentication module
///
/// Credential hashing, the RS256 token codec, the token lifecycle
/// (sessions, refresh, revocation, single-use tokens) and the request gate.

mod claims;
mod error;
mod gate;
mod jwt;
mod lifecycle;
mod password;
mod single_use;

pub use claims::{AccessClaims, RefreshClaims, SignedClaims};
pub use error::{AuthError, TokenError};
pub use gate::{authenticate, AuthContext};
pub use jwt::{TokenCodec, TokenVerifier};
pub use lifecycle::{IssuedSession, LifecyclePolicy, RefreshedAccess, TokenManager};
pub use password::{digest, CredentialHasher};

#[cfg(test)]
pub(crate) use jwt::test_keys;
