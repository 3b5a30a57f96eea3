use std::str::FromStr;

use thiserror::Error;
use tracing::{info, warn};

use crate::types::*;
use crate::Environment;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Missing required setting: {key}")]
    Missing { key: String },

    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// Builds an [`AppConfig`] from environment variables.
///
/// The lookup function is injectable so tests never touch the process
/// environment.
pub struct ConfigLoader<F>
where
    F: Fn(&str) -> Option<String>,
{
    lookup: F,
}

impl ConfigLoader<fn(&str) -> Option<String>> {
    /// Loader backed by the process environment
    pub fn from_env() -> Self {
        fn lookup(key: &str) -> Option<String> {
            std::env::var(key).ok()
        }
        Self { lookup }
    }
}

impl<F> ConfigLoader<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn with_lookup(lookup: F) -> Self {
        Self { lookup }
    }

    /// Non-empty, trimmed value for `key`
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Load and validate the full configuration
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let environment = match self
            .get("ENVIRONMENT_MODE")
            .or_else(|| self.get("NODE_ENV"))
        {
            Some(raw) => Environment::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "ENVIRONMENT_MODE".to_string(),
                value: raw,
                reason: "expected dev, test or prod".to_string(),
            })?,
            None => Environment::default(),
        };

        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: self.get("HOST").unwrap_or(server_defaults.host),
            port: self.parse("PORT", server_defaults.port)?,
            frontend_url: self
                .get("FRONTEND_URL")
                .unwrap_or(server_defaults.frontend_url),
            admin_token: self.get("QUERYBOX_ADMIN_TOKEN"),
        };

        let db_defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            url: self.get("DATABASE_URL"),
            host: self.get("PG_HOST").unwrap_or(db_defaults.host),
            port: self.parse("PG_PORT", db_defaults.port)?,
            user: self.get("PG_USER").unwrap_or(db_defaults.user),
            password: self.get("PG_PASSWORD"),
            database: self.get("PG_DATABASE").unwrap_or(db_defaults.database),
        };

        if environment.is_production()
            && database.url.is_none()
            && self.get("PG_HOST").is_none()
        {
            return Err(ConfigError::Missing {
                key: "DATABASE_URL or PG_HOST".to_string(),
            });
        }

        let pool_defaults = PoolConfig::default();
        let pool = PoolConfig {
            max_connections: self
                .parse("QUERYBOX_POOL_MAX_CONNECTIONS", pool_defaults.max_connections)?,
            min_connections: self
                .parse("QUERYBOX_POOL_MIN_CONNECTIONS", pool_defaults.min_connections)?,
            acquire_timeout_secs: self.parse(
                "QUERYBOX_POOL_ACQUIRE_TIMEOUT_SECS",
                pool_defaults.acquire_timeout_secs,
            )?,
            idle_timeout_secs: self
                .parse("QUERYBOX_POOL_IDLE_TIMEOUT_SECS", pool_defaults.idle_timeout_secs)?,
        };

        let sandbox_defaults = SandboxConfig::default();
        let mut deny_list = sandbox_defaults.deny_list;
        for keyword in self.list("QUERYBOX_EXTRA_DENY_KEYWORDS") {
            let keyword = keyword.to_uppercase();
            if !deny_list.contains(&keyword) {
                deny_list.push(keyword);
            }
        }
        let sandbox = SandboxConfig {
            statement_timeout_secs: self.parse(
                "QUERYBOX_STATEMENT_TIMEOUT_SECS",
                sandbox_defaults.statement_timeout_secs,
            )?,
            rollback_grace_ms: self
                .parse("QUERYBOX_ROLLBACK_GRACE_MS", sandbox_defaults.rollback_grace_ms)?,
            fallback_schema: self
                .get("QUERYBOX_FALLBACK_SCHEMA")
                .unwrap_or(sandbox_defaults.fallback_schema),
            deny_list,
        };

        let catalog_defaults = CatalogConfig::default();
        let source = match self.get("QUERYBOX_CATALOG_SOURCE") {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "database" | "db" => CatalogSource::Database,
                "static" => CatalogSource::Static,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "QUERYBOX_CATALOG_SOURCE".to_string(),
                        value: raw,
                        reason: "expected database or static".to_string(),
                    })
                }
            },
            None => catalog_defaults.source,
        };
        let catalog = CatalogConfig {
            source,
            database_url: self.get("CATALOG_DATABASE_URL"),
            query: self
                .get("QUERYBOX_CATALOG_QUERY")
                .unwrap_or(catalog_defaults.query),
            static_namespaces: self.list("QUERYBOX_NAMESPACES"),
            refresh_interval_secs: self.parse(
                "QUERYBOX_CATALOG_REFRESH_SECS",
                catalog_defaults.refresh_interval_secs,
            )?,
            query_timeout_secs: self.parse(
                "QUERYBOX_CATALOG_TIMEOUT_SECS",
                catalog_defaults.query_timeout_secs,
            )?,
        };

        let config = AppConfig {
            environment,
            server,
            database,
            pool,
            sandbox,
            catalog,
        };
        validate(&config)?;

        info!(
            environment = %config.environment,
            database = %config.database.redacted_target(),
            max_connections = config.pool.max_connections,
            catalog_source = ?config.catalog.source,
            "Configuration loaded"
        );

        Ok(config)
    }
}

/// Cross-field checks
pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.pool.max_connections == 0 {
        return Err(ConfigError::Invalid {
            reason: "pool.max_connections must be at least 1".to_string(),
        });
    }

    if config.pool.min_connections > config.pool.max_connections {
        return Err(ConfigError::Invalid {
            reason: format!(
                "pool.min_connections ({}) exceeds pool.max_connections ({})",
                config.pool.min_connections, config.pool.max_connections
            ),
        });
    }

    if config.pool.acquire_timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            reason: "pool.acquire_timeout_secs must be positive".to_string(),
        });
    }

    if config.sandbox.statement_timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            reason: "sandbox.statement_timeout_secs must be positive".to_string(),
        });
    }

    if config.sandbox.deny_list.is_empty() {
        warn!("Statement deny-list is empty - every statement category is permitted");
    }

    if config.catalog.source == CatalogSource::Static && config.catalog.static_namespaces.is_empty()
    {
        return Err(ConfigError::Missing {
            key: "QUERYBOX_NAMESPACES".to_string(),
        });
    }

    if config.catalog.query_timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            reason: "catalog.query_timeout_secs must be positive".to_string(),
        });
    }

    if config.catalog.source == CatalogSource::Database && config.catalog.query.trim().is_empty() {
        return Err(ConfigError::Invalid {
            reason: "catalog.query cannot be empty".to_string(),
        });
    }

    Ok(())
}
