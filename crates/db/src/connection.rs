use std::time::Duration;

use pagebot_core::config::{CloudSqlTarget, ConfigError, DatabaseConfig};
use secrecy::ExposeSecret;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use thiserror::Error;

pub type DbPool = sqlx::PgPool;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Unix-socket options for a Cloud SQL target; sqlx appends `.s.PGSQL.<port>`.
pub fn connect_options(target: &CloudSqlTarget) -> PgConnectOptions {
    PgConnectOptions::new()
        .socket(&target.socket_path)
        .database(&target.database)
        .username(&target.user)
        .password(target.password.expose_secret())
        .application_name("pagebot")
}

fn pool_options(settings: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(settings.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(settings.timeout_secs.max(1)))
}

/// Builds the pool without opening a connection. Fails only when the target
/// cannot be resolved from settings.
pub fn connect_lazy(settings: &DatabaseConfig) -> Result<DbPool, ConfigError> {
    let target = settings.target()?;
    Ok(pool_options(settings).connect_lazy_with(connect_options(&target)))
}

pub async fn connect(settings: &DatabaseConfig) -> Result<DbPool, ConnectError> {
    let target = settings.target()?;
    Ok(pool_options(settings).connect_with(connect_options(&target)).await?)
}
