/// Authentication Routes
///
/// Registration, login, refresh, logout, email verification and password
/// reset. Refresh tokens travel only in the `refTkn` cookie; the access token
/// is returned in the body for use as a bearer header.

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::configuration::CookieSettings;
use crate::domain::UserProfile;
use crate::error::AppError;
use crate::routes::cookies::{self, REFRESH_COOKIE, SESSION_COOKIE};
use crate::routes::response::{respond, respond_empty, ApiResponse};
use crate::services::{AccountService, LoginInput, RegisterInput, ResetPasswordInput};

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// Seconds until the access token expires
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl AccessTokenResponse {
    fn new(access_token: String, expires_in: chrono::Duration, user: Option<UserProfile>) -> Self {
        Self {
            access_token,
            token_type: "Bearer",
            expires_in: expires_in.num_seconds(),
            user,
        }
    }
}

fn session_cookies(req: &HttpRequest) -> (Option<String>, Option<String>) {
    (
        cookies::read(req, REFRESH_COOKIE),
        cookies::read(req, SESSION_COOKIE),
    )
}

/// POST /auth/register
///
/// Creates the account and mails a verification link. No tokens are issued
/// until the email is verified and the user logs in.
///
/// # Errors
/// - 422: Validation errors
/// - 409: Username or email already registered
/// - 503: Account created but the verification email could not be sent
pub async fn register(
    form: web::Json<RegisterInput>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let user = accounts.register(form.into_inner()).await?;

    Ok(respond(
        StatusCode::CREATED,
        "User registered successfully",
        Some(user.profile()),
    ))
}

/// POST /auth/login
///
/// # Errors
/// - 401: `WRONG_CREDENTIALS` for unknown email and wrong password alike
pub async fn login(
    form: web::Json<LoginInput>,
    accounts: web::Data<AccountService>,
    cookie_settings: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let outcome = accounts.login(form.into_inner()).await?;

    let mut builder = HttpResponse::Ok();
    cookies::set_session_cookies(&mut builder, &outcome.session, &cookie_settings);

    let body = AccessTokenResponse::new(
        outcome.session.access_token.clone(),
        outcome.session.access_ttl,
        Some(outcome.user.profile()),
    );
    Ok(ApiResponse::new(StatusCode::OK, "Login successful", Some(body)).send(builder))
}

/// POST /auth/refresh
///
/// Mints a new access token from the `refTkn` and `sid` cookies. The refresh
/// token itself is left unchanged.
pub async fn refresh(
    req: HttpRequest,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let (refresh_token, session_id) = session_cookies(&req);
    let refreshed = accounts
        .refresh(refresh_token.as_deref(), session_id.as_deref())
        .await?;

    let body = AccessTokenResponse::new(
        refreshed.access_token,
        refreshed.access_ttl,
        Some(refreshed.user.profile()),
    );
    Ok(respond(StatusCode::OK, "Access token refreshed", Some(body)))
}

/// POST /auth/refresh/rotate
///
/// Replaces the refresh token of the current session and resets both cookies.
pub async fn rotate(
    req: HttpRequest,
    accounts: web::Data<AccountService>,
    cookie_settings: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    let (refresh_token, session_id) = session_cookies(&req);
    let session = accounts
        .rotate(refresh_token.as_deref(), session_id.as_deref())
        .await?;

    let mut builder = HttpResponse::Ok();
    cookies::set_session_cookies(&mut builder, &session, &cookie_settings);

    let body = AccessTokenResponse::new(session.access_token.clone(), session.access_ttl, None);
    Ok(ApiResponse::new(StatusCode::OK, "Session rotated", Some(body)).send(builder))
}

/// POST /auth/logout
///
/// Ends the session named by the bearer token. Idempotent; cookies are
/// cleared either way.
pub async fn logout(
    ctx: web::ReqData<AuthContext>,
    accounts: web::Data<AccountService>,
    cookie_settings: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    accounts.logout(&ctx).await?;

    let mut builder = HttpResponse::Ok();
    cookies::clear_session_cookies(&mut builder, &cookie_settings);
    Ok(ApiResponse::<()>::new(StatusCode::OK, "Logout successful", None).send(builder))
}

/// POST /auth/logout/all
pub async fn logout_all(
    ctx: web::ReqData<AuthContext>,
    accounts: web::Data<AccountService>,
    cookie_settings: web::Data<CookieSettings>,
) -> Result<HttpResponse, AppError> {
    accounts.logout_all(&ctx).await?;

    let mut builder = HttpResponse::Ok();
    cookies::clear_session_cookies(&mut builder, &cookie_settings);
    Ok(ApiResponse::<()>::new(StatusCode::OK, "Logged out from all devices", None).send(builder))
}

/// POST /auth/email/verify
///
/// # Errors
/// - 400: `INVALID_TOKEN` (unknown, used or expired) or `ALREADY_VERIFIED`
/// - 404: Token owner no longer exists
pub async fn verify_email(
    form: web::Json<TokenRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    accounts.verify_email(&form.token).await?;
    Ok(respond_empty(StatusCode::OK, "Email verified successfully"))
}

/// POST /auth/email/resend-verification
///
/// Always answers the same way so the endpoint cannot be used to probe for
/// accounts.
pub async fn resend_verification(
    form: web::Json<EmailRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    accounts.resend_verification(&form.email).await?;
    Ok(respond_empty(
        StatusCode::OK,
        "If the account exists and is not verified, a verification email has been sent",
    ))
}

/// POST /auth/password/forgot
pub async fn forgot_password(
    form: web::Json<EmailRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    accounts.forgot_password(&form.email).await?;
    Ok(respond_empty(
        StatusCode::OK,
        "If the account exists, a password reset email has been sent",
    ))
}

/// POST /auth/password/verify-reset-token
pub async fn verify_reset_token(
    form: web::Json<TokenRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    accounts.verify_reset_token(&form.token).await?;
    Ok(respond_empty(StatusCode::OK, "Valid reset token"))
}

/// POST /auth/password/reset
///
/// Sets the new password and ends every session of the account.
pub async fn reset_password(
    form: web::Json<ResetPasswordInput>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    accounts.reset_password(form.into_inner()).await?;
    Ok(respond_empty(StatusCode::OK, "Password reset successfully"))
}
