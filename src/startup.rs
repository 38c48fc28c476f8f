use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::auth::{CredentialHasher, TokenManager, TokenVerifier};
use crate::configuration::{CookieSettings, DatabaseSettings, Settings};
use crate::email_client::{EmailClient, Mailer};
use crate::error::{AppError, ConfigError, ValidationError};
use crate::logger::RequestLogger;
use crate::middleware::Authentication;
use crate::routes::{
    forgot_password, get_current_user, health_check, login, logout, logout_all, refresh,
    register, resend_verification, reset_password, rotate, verify_email, verify_reset_token,
};
use crate::services::AccountService;
use crate::store::{PgStore, TokenStore, UserStore};

/// Everything request handlers share, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub verifier: Arc<TokenVerifier>,
    pub cookies: CookieSettings,
}

impl AppState {
    /// Wire the core from settings and its collaborators
    ///
    /// # Errors
    /// Key material that cannot be loaded or parsed
    pub fn build(
        settings: &Settings,
        tokens: Arc<dyn TokenStore>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, ConfigError> {
        let codec = Arc::new(settings.tokens.build_codec()?);
        let verifier = Arc::new(codec.verifier().clone());
        let manager = TokenManager::new(codec, tokens, users.clone(), settings.tokens.policy());
        let hasher = CredentialHasher::new(settings.hashing.cost);

        Ok(Self {
            accounts: AccountService::new(hasher, manager, users, mailer),
            verifier,
            cookies: settings.cookies.clone(),
        })
    }
}

pub fn get_connection_pool(configuration: &DatabaseSettings) -> Result<PgPool, ConfigError> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(configuration.acquire_timeout())
        .connect_lazy(&configuration.connection_string())
        .map_err(|e| ConfigError::InvalidValue(format!("database: {}", e)))
}

/// Production wiring: Postgres store and HTTP mailer
pub fn build_state(settings: &Settings, pool: PgPool) -> Result<AppState, ConfigError> {
    let store = Arc::new(PgStore::new(pool));
    let email_client = EmailClient::new(
        settings.email_client.base_url.clone(),
        settings.email_client.sender()?,
        settings.application.client_url.clone(),
        settings.email_client.timeout(),
    )
    .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

    AppState::build(settings, store.clone(), store, Arc::new(email_client))
}

pub fn run(listener: TcpListener, state: AppState) -> Result<Server, std::io::Error> {
    let accounts = web::Data::new(state.accounts);
    let cookies = web::Data::new(state.cookies);
    let verifier = state.verifier;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)

            // Shared state
            .app_data(accounts.clone())
            .app_data(cookies.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                tracing::debug!(error = %err, "Rejected request body");
                AppError::Validation(ValidationError::InvalidFormat("body")).into()
            }))

            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/refresh/rotate", web::post().to(rotate))
                    .route("/email/verify", web::post().to(verify_email))
                    .route("/email/resend-verification", web::post().to(resend_verification))
                    .route("/password/forgot", web::post().to(forgot_password))
                    .route("/password/verify-reset-token", web::post().to(verify_reset_token))
                    .route("/password/reset", web::post().to(reset_password))
                    .service(
                        web::resource("/logout")
                            .wrap(Authentication::new(verifier.clone()))
                            .route(web::post().to(logout)),
                    )
                    .service(
                        web::resource("/logout/all")
                            .wrap(Authentication::new(verifier.clone()))
                            .route(web::post().to(logout_all)),
                    ),
            )
            .service(
                web::scope("/users")
                    .wrap(Authentication::new(verifier.clone()))
                    .route("/me", web::get().to(get_current_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
