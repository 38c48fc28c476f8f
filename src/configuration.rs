/// Application configuration
///
/// Loaded once at startup from an optional `configuration.{yaml,json,toml}`
/// file overlaid with `APP_`-prefixed environment variables
/// (`APP_TOKENS__ACCESS_TOKEN_TTL_SECS=900`). Anything missing or invalid
/// aborts startup; nothing here is re-read per request.

use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::auth::{LifecyclePolicy, TokenCodec};
use crate::email_client::SenderEmail;
use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub tokens: TokenSettings,
    #[serde(default)]
    pub hashing: HashingSettings,
    pub email_client: EmailClientSettings,
    #[serde(default)]
    pub cookies: CookieSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Front-end base URL used in verification and reset links
    pub client_url: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    pub fn acquire_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.acquire_timeout_secs)
    }
}

/// Upper bound for any token lifetime, remember-me included (ten years)
const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Token lifetimes and signing key material
#[derive(serde::Deserialize, Clone)]
pub struct TokenSettings {
    pub issuer: String,
    pub access_token_ttl_secs: i64,   // e.g. 900 for 15 minutes
    pub refresh_token_ttl_secs: i64,  // e.g. 604800 for 7 days
    #[serde(default = "default_remember_me_multiplier")]
    pub remember_me_multiplier: i32,
    #[serde(default = "default_single_use_ttl_secs")]
    pub single_use_ttl_secs: i64,
    pub private_key_pem: Option<String>,
    pub private_key_path: Option<String>,
    pub public_key_pem: Option<String>,
    pub public_key_path: Option<String>,
}

impl TokenSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("tokens.access_token_ttl_secs", self.access_token_ttl_secs),
            ("tokens.refresh_token_ttl_secs", self.refresh_token_ttl_secs),
            ("tokens.single_use_ttl_secs", self.single_use_ttl_secs),
        ] {
            if value <= 0 {
                return Err(ConfigError::InvalidValue(format!("{} must be positive", name)));
            }
            if value > MAX_TTL_SECS {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must not exceed {} seconds",
                    name, MAX_TTL_SECS
                )));
            }
        }
        if self.remember_me_multiplier < 1 {
            return Err(ConfigError::InvalidValue(
                "tokens.remember_me_multiplier must be at least 1".to_string(),
            ));
        }
        let remembered = self
            .refresh_token_ttl_secs
            .checked_mul(i64::from(self.remember_me_multiplier))
            .filter(|secs| *secs <= MAX_TTL_SECS);
        if remembered.is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "tokens.refresh_token_ttl_secs * tokens.remember_me_multiplier must not exceed {} seconds",
                MAX_TTL_SECS
            )));
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("tokens.issuer".to_string()));
        }
        Ok(())
    }

    pub fn policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            access_ttl: Duration::seconds(self.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(self.refresh_token_ttl_secs),
            remember_me_multiplier: self.remember_me_multiplier,
            single_use_ttl: Duration::seconds(self.single_use_ttl_secs),
        }
    }

    /// Load the keypair and build the codec
    ///
    /// # Errors
    /// Missing key material or PEM that does not parse as RSA
    pub fn build_codec(&self) -> Result<TokenCodec, ConfigError> {
        let private_pem = load_pem(
            "tokens.private_key",
            self.private_key_pem.as_deref(),
            self.private_key_path.as_deref(),
        )?;
        let public_pem = load_pem(
            "tokens.public_key",
            self.public_key_pem.as_deref(),
            self.public_key_path.as_deref(),
        )?;

        TokenCodec::from_rsa_pem(private_pem.as_bytes(), public_pem.as_bytes(), &self.issuer)
            .map_err(|e| ConfigError::InvalidValue(format!("signing keypair: {}", e)))
    }
}

fn load_pem(name: &str, inline: Option<&str>, path: Option<&str>) -> Result<String, ConfigError> {
    match (inline, path) {
        (Some(pem), _) => Ok(pem.to_string()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| ConfigError::InvalidValue(format!("{}_path {}: {}", name, path, e))),
        (None, None) => Err(ConfigError::MissingRequired(format!(
            "{}_pem or {}_path",
            name, name
        ))),
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct HashingSettings {
    pub cost: u32,
}

impl Default for HashingSettings {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct EmailClientSettings {
    pub base_url: String,
    pub sender_email: String,
    #[serde(default = "default_email_timeout_millis")]
    pub timeout_millis: u64,
}

impl EmailClientSettings {
    pub fn sender(&self) -> Result<SenderEmail, ConfigError> {
        SenderEmail::parse(self.sender_email.clone()).map_err(ConfigError::InvalidValue)
    }

    pub fn timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.timeout_millis)
    }
}

/// Attributes for the refresh and session cookies
#[derive(serde::Deserialize, Clone)]
pub struct CookieSettings {
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self { secure: true }
    }
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_remember_me_multiplier() -> i32 {
    30
}

fn default_single_use_ttl_secs() -> i64 {
    24 * 60 * 60
}

fn default_email_timeout_millis() -> u64 {
    10_000
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tokens.validate()?;
        if !(4..=31).contains(&self.hashing.cost) {
            return Err(ConfigError::InvalidValue(
                "hashing.cost must be between 4 and 31".to_string(),
            ));
        }
        self.email_client.sender()?;
        Ok(())
    }
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    let settings = settings
        .try_deserialize::<Settings>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    settings.validate()?;
    Ok(settings)
}
