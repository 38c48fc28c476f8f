/// Authentication gate
///
/// Turns an `Authorization` header value into a verified identity. Nothing
/// from the token is exposed unless the whole token verified.

use uuid::Uuid;

use crate::auth::claims::AccessClaims;
use crate::auth::error::AuthError;
use crate::auth::jwt::TokenVerifier;

const BEARER_PREFIX: &str = "Bearer ";

/// Identity attached to an authenticated request
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub session_id: String,
    pub raw_token: String,
}

/// Verify a bearer credential
///
/// # Arguments
/// * `header` - raw `Authorization` header value, if any
/// * `verifier` - public-key verifier shared by the process
///
/// # Errors
/// * `MissingCredentials` - header absent or not using the `Bearer` scheme
/// * `AccessToken(Expired)` - distinguishable so clients refresh instead of re-login
/// * `AccessToken(Malformed | InvalidSignature)` - any other rejection
pub fn authenticate(header: Option<&str>, verifier: &TokenVerifier) -> Result<AuthContext, AuthError> {
    let token = header
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingCredentials)?;

    let claims = verifier
        .verify::<AccessClaims>(token)
        .map_err(AuthError::AccessToken)?;
    let user_id = claims.body.user_id().map_err(AuthError::AccessToken)?;

    Ok(AuthContext {
        user_id,
        session_id: claims.body.sid,
        raw_token: token.to_string(),
    })
}
