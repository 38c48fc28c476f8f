use std::net::TcpListener;

use sessionward::configuration::get_configuration;
use sessionward::startup::{build_state, get_connection_pool, run};
use sessionward::telemetry::init_telemetry;

fn startup_error(kind: std::io::ErrorKind, context: &str, err: impl std::fmt::Display) -> std::io::Error {
    tracing::error!(error = %err, "{}", context);
    std::io::Error::new(kind, format!("{}: {}", context, err))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = get_configuration()
        .map_err(|e| startup_error(std::io::ErrorKind::InvalidInput, "Failed to read configuration", e))?;
    tracing::info!("Configuration loaded successfully");

    let pool = get_connection_pool(&configuration.database)
        .map_err(|e| startup_error(std::io::ErrorKind::InvalidInput, "Invalid database settings", e))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| startup_error(std::io::ErrorKind::ConnectionRefused, "Failed to migrate the database", e))?;
    tracing::info!("Database migrations applied");

    let state = build_state(&configuration, pool)
        .map_err(|e| startup_error(std::io::ErrorKind::InvalidInput, "Failed to build application state", e))?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!(address = %address, "Server listening");

    run(listener, state)?.await
}
