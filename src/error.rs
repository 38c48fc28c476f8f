/// Application error handling
///
/// The core reports semantic outcomes (`AuthError`, `ValidationError`,
/// `EmailError`). `AppError` is the only place those become HTTP status
/// codes, headers and the JSON error envelope.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

use crate::auth::{AuthError, TokenError};
pub use crate::validators::ValidationError;

/// Outbound mail failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmailError {
    #[error("failed to send email: {0}")]
    SendFailed(String),
    #[error("email service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("email client misconfigured: {0}")]
    ConfigurationError(String),
}

/// Configuration errors; always fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config: {0}")]
    MissingRequired(String),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
    #[error("config parse error: {0}")]
    ParseError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for the envelope
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Auth(e) => e.code(),
            AppError::Email(_) => "EMAIL_SERVICE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Validation(_) => "Validation failed".to_string(),
            AppError::Auth(e) => e.client_message(),
            AppError::Email(_) => "Email service temporarily unavailable".to_string(),
            AppError::Config(_) => "Server configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Signal headers that let clients pick between refresh and re-login
    fn signal_header(&self) -> Option<&'static str> {
        match self {
            AppError::Auth(AuthError::AccessToken(TokenError::Expired)) => {
                Some("X-Access-Token-Expired")
            }
            AppError::Auth(AuthError::AccessToken(_)) | AppError::Auth(AuthError::MissingCredentials) => {
                Some("X-Access-Token-Invalid")
            }
            AppError::Auth(AuthError::RefreshTokenMissing) => Some("X-Refresh-Token-Missing"),
            AppError::Auth(
                AuthError::RefreshToken(_)
                | AuthError::InvalidRefreshToken
                | AuthError::InvalidSession,
            ) => Some("X-Refresh-Token-Invalid"),
            _ => None,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, serde::Serialize)]
pub struct ErrorMeta {
    pub timestamp: String,
    /// Correlates the response with the server-side log line
    #[serde(rename = "errorId")]
    pub error_id: String,
}

/// Error envelope for HTTP responses
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub status_code: u16,
    /// Error code for client-side handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    pub meta: ErrorMeta,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            success: false,
            status_code: status,
            code,
            message,
            errors: None,
            meta: ErrorMeta {
                timestamp: chrono::Utc::now().to_rfc3339(),
                error_id,
            },
        }
    }

    pub fn with_errors(mut self, errors: Vec<FieldError>) -> Self {
        self.errors = Some(errors);
        self
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::AccessToken(_)
        | AuthError::RefreshToken(_)
        | AuthError::MissingCredentials
        | AuthError::RefreshTokenMissing
        | AuthError::InvalidRefreshToken
        | AuthError::InvalidSession
        | AuthError::WrongCredentials => StatusCode::UNAUTHORIZED,
        AuthError::TokenNotFound
        | AuthError::TokenConsumed
        | AuthError::TokenExpired
        | AuthError::AlreadyVerified => StatusCode::BAD_REQUEST,
        AuthError::UserNotFound => StatusCode::NOT_FOUND,
        AuthError::Conflict(_) => StatusCode::CONFLICT,
        AuthError::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::HashFailure | AuthError::TokenIssue(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let status = self.status_code();
        let mut response = ErrorResponse::new(
            request_id.to_string(),
            self.client_message(),
            self.code().to_string(),
            status.as_u16(),
        );

        if let AppError::Validation(e) = self {
            response = response.with_errors(vec![FieldError {
                field: e.field().to_string(),
                message: e.to_string(),
            }]);
        }

        (status, response)
    }

    fn log_error(&self, request_id: &str) {
        let server_fault = match self {
            AppError::Validation(_) => false,
            AppError::Auth(e) => matches!(
                e,
                AuthError::Infrastructure(_) | AuthError::HashFailure | AuthError::TokenIssue(_)
            ),
            AppError::Email(_) | AppError::Config(_) | AppError::Internal(_) => true,
        };

        if server_fault {
            tracing::error!(request_id, code = self.code(), error = %self, "Request failed");
        } else {
            tracing::warn!(request_id, code = self.code(), error = %self, "Request rejected");
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        let mut builder = HttpResponse::build(status);
        if let Some(header) = self.signal_header() {
            builder.insert_header((header, "true"));
        }
        builder.json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Auth(e) => auth_status(e),
            AppError::Email(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
