//! CLI subcommands.

pub mod migrate;
pub mod orders;

use roastery_storefront::db;
use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

/// Errors shared by commands that need the storefront database.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read a required environment variable.
pub fn required_env(key: &'static str) -> Result<String, ConnectError> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConnectError::MissingEnvVar(key))
}

/// Connect to the storefront database named by `STOREFRONT_DATABASE_URL`.
pub async fn connect() -> Result<PgPool, ConnectError> {
    dotenvy::dotenv().ok();

    let database_url = SecretString::from(required_env("STOREFRONT_DATABASE_URL")?);

    tracing::info!("Connecting to storefront database...");
    Ok(db::create_pool(&database_url).await?)
}
