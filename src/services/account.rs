/// Account flows
///
/// Glue between validated input, the credential hasher, the token lifecycle
/// and the mailer. Returns `AppError` because a single flow can fail on
/// input, on authentication or on delivery.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AuthContext, AuthError, CredentialHasher, IssuedSession, RefreshedAccess, TokenManager};
use crate::domain::{NewUser, Role, SingleUsePurpose, User};
use crate::email_client::Mailer;
use crate::error::AppError;
use crate::store::UserStore;
use crate::validators::{
    is_valid_email, is_valid_name, is_valid_password, is_valid_token, is_valid_username,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordInput {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub session: IssuedSession,
    pub user: User,
}

fn optional_name(field: &'static str, value: Option<&str>) -> Result<Option<String>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Ok(Some(is_valid_name(field, v)?)),
        None => Ok(None),
    }
}

#[derive(Clone)]
pub struct AccountService {
    hasher: CredentialHasher,
    manager: TokenManager,
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
}

impl AccountService {
    pub fn new(
        hasher: CredentialHasher,
        manager: TokenManager,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            hasher,
            manager,
            users,
            mailer,
        }
    }

    pub fn manager(&self) -> &TokenManager {
        &self.manager
    }

    /// Create an account and send its verification link
    ///
    /// The user row and its verification token are stored together; delivery
    /// happens after commit, so a mail failure leaves a valid token behind.
    ///
    /// # Errors
    /// * `Validation` - malformed input
    /// * `Auth(Conflict)` - username or email already taken
    /// * `Email` - account created but the link could not be delivered
    pub async fn register(&self, input: RegisterInput) -> Result<User, AppError> {
        let username = is_valid_username(&input.username)?;
        let email = is_valid_email(&input.email)?;
        is_valid_password("password", &input.password)?;
        let first_name = is_valid_name("firstName", &input.first_name)?;
        let middle_name = optional_name("middleName", input.middle_name.as_deref())?;
        let last_name = optional_name("lastName", input.last_name.as_deref())?;

        let password_hash = self.hasher.hash_password(&input.password).await?;

        let user_id = Uuid::new_v4();
        let verification = self
            .manager
            .new_single_use(user_id, SingleUsePurpose::EmailVerification);
        let token_value = verification.value.clone();

        let user = self
            .users
            .create_user(
                NewUser {
                    id: user_id,
                    username,
                    email,
                    password_hash: Some(password_hash),
                    role: Role::default(),
                    first_name,
                    middle_name,
                    last_name,
                },
                Some(verification),
            )
            .await
            .map_err(AuthError::from)?;

        tracing::info!(user_id = %user.id, "User registered");

        self.mailer
            .send_verification_email(&user.email, &token_value)
            .await?;

        Ok(user)
    }

    /// Authenticate with email and password and start a session
    ///
    /// Every credential failure is the same `WRONG_CREDENTIALS`, and unknown
    /// accounts still pay for one bcrypt comparison.
    pub async fn login(&self, input: LoginInput) -> Result<LoginOutcome, AppError> {
        let email = is_valid_email(&input.email)?;

        let user = self.users.find_by_email(&email).await.map_err(AuthError::from)?;

        // Password-less accounts authenticate elsewhere; treat them as unknown
        let (user, stored_hash) = match user {
            Some(user) => match user.password_hash.clone() {
                Some(hash) => (user, hash),
                None => return Err(self.reject_unknown(&input.password).await),
            },
            None => return Err(self.reject_unknown(&input.password).await),
        };

        if !self.hasher.compare_password(&input.password, &stored_hash).await {
            tracing::warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AuthError::WrongCredentials.into());
        }

        self.users.record_login(user.id).await.map_err(AuthError::from)?;
        let session = self.manager.issue_session(&user, input.remember_me).await?;

        Ok(LoginOutcome { session, user })
    }

    async fn reject_unknown(&self, password: &str) -> AppError {
        self.hasher.compare_against_dummy(password).await;
        tracing::warn!("Login failed: no usable account");
        AuthError::WrongCredentials.into()
    }

    pub async fn refresh(
        &self,
        refresh_token: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<RefreshedAccess, AppError> {
        let refresh_token = refresh_token.ok_or(AuthError::RefreshTokenMissing)?;
        Ok(self
            .manager
            .refresh(refresh_token, session_id.unwrap_or_default())
            .await?)
    }

    /// Replace the refresh token of the current session
    pub async fn rotate(
        &self,
        refresh_token: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<IssuedSession, AppError> {
        let refresh_token = refresh_token.ok_or(AuthError::RefreshTokenMissing)?;
        Ok(self
            .manager
            .reissue(refresh_token, session_id.unwrap_or_default())
            .await?)
    }

    pub async fn logout(&self, ctx: &AuthContext) -> Result<(), AppError> {
        self.manager.revoke_session(ctx.user_id, &ctx.session_id).await?;
        Ok(())
    }

    pub async fn logout_all(&self, ctx: &AuthContext) -> Result<u64, AppError> {
        Ok(self.manager.revoke_all(ctx.user_id).await?)
    }

    pub async fn verify_email(&self, token: &str) -> Result<User, AppError> {
        let token = is_valid_token(token)?;
        Ok(self.manager.consume_email_verification(&token).await?)
    }

    /// Send a new verification link if the account exists and is unverified
    ///
    /// The outcome is never reported to the caller.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AppError> {
        let email = is_valid_email(email)?;
        let user = match self.users.find_by_email(&email).await.map_err(AuthError::from)? {
            Some(user) if !user.is_email_verified() => user,
            _ => return Ok(()),
        };

        let token = self
            .manager
            .issue_single_use(user.id, SingleUsePurpose::EmailVerification)
            .await?;
        if let Err(e) = self.mailer.send_verification_email(&user.email, &token).await {
            tracing::error!(user_id = %user.id, error = %e, "Failed to resend verification email");
        }
        Ok(())
    }

    /// Send a password reset link if the account exists
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let email = is_valid_email(email)?;
        let user = match self.users.find_by_email(&email).await.map_err(AuthError::from)? {
            Some(user) => user,
            None => return Ok(()),
        };

        let token = self
            .manager
            .issue_single_use(user.id, SingleUsePurpose::PasswordReset)
            .await?;
        if let Err(e) = self.mailer.send_password_reset_email(&user.email, &token).await {
            tracing::error!(user_id = %user.id, error = %e, "Failed to send password reset email");
        }
        Ok(())
    }

    pub async fn verify_reset_token(&self, token: &str) -> Result<(), AppError> {
        let token = is_valid_token(token)?;
        self.manager
            .find_single_use(&token, SingleUsePurpose::PasswordReset)
            .await?;
        Ok(())
    }

    /// Set a new password from a reset token; ends every session of the user
    pub async fn reset_password(&self, input: ResetPasswordInput) -> Result<(), AppError> {
        let token = is_valid_token(&input.token)?;
        is_valid_password("newPassword", &input.new_password)?;

        // Reject bad tokens before paying for a hash
        self.manager
            .find_single_use(&token, SingleUsePurpose::PasswordReset)
            .await?;

        let password_hash = self.hasher.hash_password(&input.new_password).await?;
        self.manager
            .consume_password_reset(&token, &password_hash)
            .await?;
        Ok(())
    }

    pub async fn me(&self, ctx: &AuthContext) -> Result<User, AppError> {
        self.users
            .find_by_id(ctx.user_id)
            .await
            .map_err(AuthError::from)?
            .ok_or_else(|| AuthError::UserNotFound.into())
    }
}
