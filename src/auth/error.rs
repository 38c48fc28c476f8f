/// Error taxonomy of the credential lifecycle core
///
/// These are semantic outcomes only. Mapping to transport status codes
/// happens in `crate::error::AppError`.

use thiserror::Error;

use crate::store::StoreError;

/// Why a signed token was rejected by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is structurally invalid")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("token signature is invalid")]
    InvalidSignature,
}

impl TokenError {
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Malformed => "MALFORMED",
            TokenError::Expired => "EXPIRED",
            TokenError::InvalidSignature => "INVALID_SIGNATURE",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bearer token presented to the authentication gate was rejected
    #[error("access token rejected: {0}")]
    AccessToken(TokenError),
    /// Refresh token was rejected by the codec before any store lookup
    #[error("refresh token rejected: {0}")]
    RefreshToken(TokenError),
    #[error("missing bearer credentials")]
    MissingCredentials,
    #[error("refresh token not found")]
    RefreshTokenMissing,
    /// Claimed session id differs from the one embedded in the refresh token
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    /// Refresh token is genuine but has no live, matching store record
    #[error("invalid session")]
    InvalidSession,
    #[error("wrong credentials")]
    WrongCredentials,
    #[error("password hashing failed")]
    HashFailure,
    #[error("single-use token does not exist")]
    TokenNotFound,
    #[error("single-use token was already used")]
    TokenConsumed,
    #[error("single-use token has expired")]
    TokenExpired,
    #[error("email already verified")]
    AlreadyVerified,
    #[error("user not found")]
    UserNotFound,
    #[error("{0} already in use")]
    Conflict(String),
    #[error("token issuance failed: {0}")]
    TokenIssue(String),
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl AuthError {
    /// Stable code used in logs and in the client-facing envelope.
    ///
    /// The three single-use failures share `INVALID_TOKEN` so clients cannot
    /// tell a consumed token from one that never existed.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::AccessToken(TokenError::Expired) => "ACCESS_TOKEN_EXPIRED",
            AuthError::AccessToken(_) => "ACCESS_TOKEN_INVALID",
            AuthError::RefreshToken(TokenError::Expired) => "REFRESH_TOKEN_EXPIRED",
            AuthError::RefreshToken(_) => "REFRESH_TOKEN_INVALID",
            AuthError::MissingCredentials => "AUTHENTICATION_ERROR",
            AuthError::RefreshTokenMissing => "REFRESH_TOKEN_MISSING",
            AuthError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AuthError::InvalidSession => "INVALID_SESSION",
            AuthError::WrongCredentials => "WRONG_CREDENTIALS",
            AuthError::HashFailure => "HASH_FAILURE",
            AuthError::TokenNotFound | AuthError::TokenConsumed | AuthError::TokenExpired => {
                "INVALID_TOKEN"
            }
            AuthError::AlreadyVerified => "ALREADY_VERIFIED",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::Conflict(_) => "DUPLICATE_ENTRY",
            AuthError::TokenIssue(_) => "TOKEN_ISSUE_ERROR",
            AuthError::Infrastructure(_) => "INFRASTRUCTURE_ERROR",
        }
    }

    /// Message safe to show to clients.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::AccessToken(TokenError::Expired) => {
                "Access token expired. Please refresh your token.".to_string()
            }
            AuthError::AccessToken(_) => {
                "Invalid access token. Please provide a valid token.".to_string()
            }
            AuthError::RefreshToken(TokenError::Expired) => {
                "Refresh token expired. Please login again.".to_string()
            }
            AuthError::RefreshToken(_) => {
                "Invalid token. Please provide a valid token.".to_string()
            }
            AuthError::MissingCredentials => {
                "Authorization header missing. Please provide a valid token.".to_string()
            }
            AuthError::RefreshTokenMissing => "Refresh token not found".to_string(),
            AuthError::InvalidRefreshToken => "Invalid refresh token".to_string(),
            AuthError::InvalidSession => "Invalid session".to_string(),
            AuthError::WrongCredentials => "Wrong credentials".to_string(),
            AuthError::TokenNotFound | AuthError::TokenConsumed | AuthError::TokenExpired => {
                "Invalid or expired token".to_string()
            }
            AuthError::AlreadyVerified => "Email already verified".to_string(),
            AuthError::UserNotFound => "User not found".to_string(),
            AuthError::Conflict(field) => format!("{} already in use", field),
            AuthError::Infrastructure(_) => "Service temporarily unavailable".to_string(),
            AuthError::HashFailure | AuthError::TokenIssue(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(field) => AuthError::Conflict(field),
            StoreError::TokenAlreadyConsumed => AuthError::TokenConsumed,
            StoreError::Unavailable(msg) | StoreError::Query(msg) => AuthError::Infrastructure(msg),
        }
    }
}
