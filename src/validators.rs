/// Input validators for account payloads
///
/// Each validator returns the normalized value on success. Lengths are
/// bounded on every field to keep hashing and storage costs predictable.

use lazy_static::lazy_static;
use regex::Regex;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 32;
const MAX_NAME_LENGTH: usize = 100;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 72; // bcrypt ignores everything past 72 bytes
const MAX_TOKEN_LENGTH: usize = 256;

lazy_static! {
    // dot-atom local part, LDH labels
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9_.-]+$").unwrap();
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} can not be empty")]
    EmptyField(&'static str),
    #[error("{0} must be at least {1} characters long")]
    TooShort(&'static str, usize),
    #[error("{0} must be at most {1} characters long")]
    TooLong(&'static str, usize),
    #[error("{0} is invalid")]
    InvalidFormat(&'static str),
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::EmptyField(field)
            | ValidationError::TooShort(field, _)
            | ValidationError::TooLong(field, _)
            | ValidationError::InvalidFormat(field) => field,
        }
    }
}

fn bounded(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    let length = value.chars().count();
    if length < min {
        return Err(ValidationError::TooShort(field, min));
    }
    if length > max {
        return Err(ValidationError::TooLong(field, max));
    }
    Ok(())
}

/// Validates an email address and lowercases it
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();
    bounded("email", trimmed, MIN_EMAIL_LENGTH, MAX_EMAIL_LENGTH)?;

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email"));
    }

    // Local part is limited to 64 octets
    if trimmed.split('@').next().map_or(0, str::len) > 64 {
        return Err(ValidationError::InvalidFormat("email"));
    }

    Ok(trimmed.to_lowercase())
}

pub fn is_valid_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();
    bounded("username", trimmed, MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH)?;

    if !USERNAME_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("username"));
    }

    Ok(trimmed.to_string())
}

/// Validates a person name (first, middle or last)
pub fn is_valid_name(field: &'static str, name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    bounded(field, trimmed, 1, MAX_NAME_LENGTH)?;

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat(field));
    }

    Ok(trimmed.to_string())
}

/// Passwords are not trimmed; whitespace is significant
pub fn is_valid_password(field: &'static str, password: &str) -> Result<(), ValidationError> {
    bounded(field, password, MIN_PASSWORD_LENGTH, usize::MAX)?;
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(field, MAX_PASSWORD_LENGTH));
    }
    Ok(())
}

/// Shape check for an opaque single-use token before any store lookup
pub fn is_valid_token(token: &str) -> Result<String, ValidationError> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("token"));
    }
    if trimmed.len() > MAX_TOKEN_LENGTH {
        return Err(ValidationError::TooLong("token", MAX_TOKEN_LENGTH));
    }
    Ok(trimmed.to_string())
}
