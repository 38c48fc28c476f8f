use actix_web::{http::StatusCode, web, HttpResponse};

use crate::auth::AuthContext;
use crate::error::AppError;
use crate::routes::response::respond;
use crate::services::AccountService;

/// GET /users/me
///
/// Profile of the authenticated user. Requires a bearer access token.
pub async fn get_current_user(
    ctx: web::ReqData<AuthContext>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let user = accounts.me(&ctx).await?;
    Ok(respond(StatusCode::OK, "User fetched successfully", Some(user.profile())))
}
