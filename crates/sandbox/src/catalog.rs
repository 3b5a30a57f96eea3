//! Sources of registered namespaces

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;
use tracing::debug;

/// Read-only view of the assignment catalog
#[async_trait::async_trait]
pub trait NamespaceCatalog: Send + Sync {
    /// Every distinct namespace value currently in use
    async fn distinct_namespaces(&self) -> Result<Vec<String>>;

    /// Short label for logs
    fn describe(&self) -> String;
}

/// Catalog backed by a table in PostgreSQL
pub struct PgNamespaceCatalog {
    pool: PgPool,
    query: String,
    timeout: Duration,
}

impl PgNamespaceCatalog {
    pub fn new(pool: PgPool, query: impl Into<String>) -> Self {
        Self {
            pool,
            query: query.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl NamespaceCatalog for PgNamespaceCatalog {
    async fn distinct_namespaces(&self) -> Result<Vec<String>> {
        debug!(query = %self.query, "Reading namespaces from catalog");

        let rows = tokio::time::timeout(
            self.timeout,
            sqlx::query_scalar::<_, Option<String>>(&self.query)
                .persistent(false)
                .fetch_all(&self.pool),
        )
        .await
        .with_context(|| format!("Catalog query timed out after {:?}", self.timeout))?
        .context("Failed to read namespaces from catalog")?;

        Ok(rows.into_iter().flatten().collect())
    }

    fn describe(&self) -> String {
        "postgres catalog".to_string()
    }
}

/// Fixed namespace list, typically from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticNamespaceCatalog {
    namespaces: Vec<String>,
}

impl StaticNamespaceCatalog {
    pub fn new<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespaces: namespaces.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait::async_trait]
impl NamespaceCatalog for StaticNamespaceCatalog {
    async fn distinct_namespaces(&self) -> Result<Vec<String>> {
        Ok(self.namespaces.clone())
    }

    fn describe(&self) -> String {
        format!("static catalog ({} entries)", self.namespaces.len())
    }
}
