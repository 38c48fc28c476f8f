mod auth;
mod cookies;
mod health_check;
mod response;
mod users;

pub use auth::{
    forgot_password, login, logout, logout_all, refresh, register, resend_verification,
    reset_password, rotate, verify_email, verify_reset_token,
};
pub use cookies::{REFRESH_COOKIE, SESSION_COOKIE};
pub use health_check::health_check;
pub use response::ApiResponse;
pub use users::get_current_user;
