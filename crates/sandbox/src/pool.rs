//! Sandbox connection pool construction

use anyhow::{Context, Result};
use querybox_config::{DatabaseConfig, PoolConfig};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

const APPLICATION_NAME: &str = "querybox";

/// Connection options from either the URL or the discrete settings
pub fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    let options = match &config.url {
        Some(url) => url
            .parse::<PgConnectOptions>()
            .context("Invalid sandbox database URL")?,
        None => {
            let options = PgConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .username(&config.user)
                .database(&config.database);
            match &config.password {
                Some(password) => options.password(password),
                None => options,
            }
        }
    };

    Ok(options.application_name(APPLICATION_NAME))
}

/// Bounded pool settings; connections are pinged before being handed out
pub fn pool_options(config: &PoolConfig) -> PgPoolOptions {
    let options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .test_before_acquire(true);

    if config.idle_timeout_secs > 0 {
        options.idle_timeout(Duration::from_secs(config.idle_timeout_secs))
    } else {
        options.idle_timeout(None)
    }
}

/// Build the sandbox pool without opening a connection.
///
/// The server starts even when the database is down; requests then fail
/// with `PoolExhausted` until it comes back.
pub fn connect_lazy(database: &DatabaseConfig, pool: &PoolConfig) -> Result<PgPool> {
    let options = connect_options(database)?;

    info!(
        target = %database.redacted_target(),
        max_connections = pool.max_connections,
        "Creating sandbox connection pool"
    );

    Ok(pool_options(pool).connect_lazy_with(options))
}
