/// Persisted credential records
///
/// Access tokens are stateless and never reach the store, so `TokenKind`
/// only names the kinds that are actually written to the `tokens` table.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Refresh,
    PasswordReset,
    EmailVerification,
    PhoneVerification,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Refresh => "REFRESH_TOKEN",
            TokenKind::PasswordReset => "PASSWORD_RESET",
            TokenKind::EmailVerification => "EMAIL_VERIFICATION",
            TokenKind::PhoneVerification => "PHONE_VERIFICATION",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REFRESH_TOKEN" => Ok(TokenKind::Refresh),
            "PASSWORD_RESET" => Ok(TokenKind::PasswordReset),
            "EMAIL_VERIFICATION" => Ok(TokenKind::EmailVerification),
            "PHONE_VERIFICATION" => Ok(TokenKind::PhoneVerification),
            other => Err(format!("unknown token kind: {}", other)),
        }
    }
}

/// Purposes a single-use (out-of-band) token can be issued for.
///
/// Kept separate from `TokenKind` so a refresh token can never be minted
/// through the single-use path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleUsePurpose {
    EmailVerification,
    PasswordReset,
    PhoneVerification,
}

impl SingleUsePurpose {
    pub fn kind(&self) -> TokenKind {
        match self {
            SingleUsePurpose::EmailVerification => TokenKind::EmailVerification,
            SingleUsePurpose::PasswordReset => TokenKind::PasswordReset,
            SingleUsePurpose::PhoneVerification => TokenKind::PhoneVerification,
        }
    }
}

/// A stored token row.
///
/// `active` alone does not make a token acceptable; consumers must also
/// check `expires_at` (see [`TokenRecord::is_usable`]).
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TokenKind,
    /// SHA-256 digest for refresh tokens, random plaintext for single-use tokens
    pub value: String,
    pub session_id: Option<String>,
    pub active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired_at(now)
    }

    pub fn is_usable(&self) -> bool {
        self.is_usable_at(Utc::now())
    }
}

/// Insert payload for a token row. Always inserted with `active = true`.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TokenKind,
    pub value: String,
    pub session_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl NewToken {
    pub fn into_record(self, now: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            id: self.id,
            user_id: self.user_id,
            kind: self.kind,
            value: self.value,
            session_id: self.session_id,
            active: true,
            expires_at: self.expires_at,
            created_at: now,
            updated_at: now,
        }
    }
}
