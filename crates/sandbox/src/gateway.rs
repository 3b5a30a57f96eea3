//! Sandbox gateway: the single entry point consumed by the request layer

use anyhow::{Context, Result};
use querybox_config::{AppConfig, CatalogSource};
use querybox_models::{
    ExecutionRequest, ExecutionResult, LoadReport, RegistryStatus, SandboxResult,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::catalog::{NamespaceCatalog, PgNamespaceCatalog, StaticNamespaceCatalog};
use crate::executor::{
    ConnectionSource, ExecutorConfig, PgConnectionSource, PoolStatus, SandboxExecutor,
};
use crate::policy::StatementPolicy;
use crate::pool;
use crate::registry::NamespaceRegistry;

/// Sandboxed execution plus the namespace registry that gates it
pub struct SandboxGateway<S: ConnectionSource = PgConnectionSource> {
    executor: SandboxExecutor<S>,
    registry: Arc<NamespaceRegistry>,
    catalog: Arc<dyn NamespaceCatalog>,
}

impl<S: ConnectionSource> SandboxGateway<S> {
    pub fn new(
        source: S,
        catalog: Arc<dyn NamespaceCatalog>,
        policy: StatementPolicy,
        config: ExecutorConfig,
    ) -> Self {
        let registry = Arc::new(NamespaceRegistry::new());
        let executor = SandboxExecutor::new(source, registry.clone(), policy, config);
        Self {
            executor,
            registry,
            catalog,
        }
    }

    /// Run `sql` against `namespace`; nothing it does persists
    pub async fn execute_query(&self, sql: &str, namespace: &str) -> SandboxResult<ExecutionResult> {
        self.executor.execute(sql, namespace).await
    }

    pub async fn execute(&self, request: &ExecutionRequest) -> SandboxResult<ExecutionResult> {
        self.executor.execute(&request.sql, &request.namespace).await
    }

    /// Reload the registry from the catalog.
    ///
    /// A failure leaves the previous registry in place and is not fatal.
    pub async fn reload_registry(&self) -> SandboxResult<LoadReport> {
        self.registry.load(self.catalog.as_ref()).await
    }

    pub async fn registry_status(&self) -> RegistryStatus {
        self.registry.status().await
    }

    pub fn registry(&self) -> &Arc<NamespaceRegistry> {
        &self.registry
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.executor.source().status()
    }
}

impl SandboxGateway<PgConnectionSource> {
    /// Build the pool, catalog and executor from application config.
    ///
    /// No connection is opened here; call [`reload_registry`] afterwards to
    /// populate the registry.
    ///
    /// [`reload_registry`]: SandboxGateway::reload_registry
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let pool = pool::connect_lazy(&config.database, &config.pool)?;
        let catalog = build_catalog(config, &pool)?;
        let executor_config = ExecutorConfig::from_config(&config.sandbox)
            .context("Invalid fallback schema")?;
        let policy = StatementPolicy::from_config(&config.sandbox);

        info!(
            catalog = %catalog.describe(),
            deny_keywords = policy.deny_list().len(),
            statement_timeout_secs = executor_config.statement_timeout.as_secs(),
            "Sandbox gateway configured"
        );

        Ok(Self::new(
            PgConnectionSource::new(pool),
            catalog,
            policy,
            executor_config,
        ))
    }

    pub fn pool(&self) -> &PgPool {
        self.executor.source().pool()
    }
}

fn build_catalog(config: &AppConfig, sandbox_pool: &PgPool) -> Result<Arc<dyn NamespaceCatalog>> {
    let catalog: Arc<dyn NamespaceCatalog> = match config.catalog.source {
        CatalogSource::Static => Arc::new(StaticNamespaceCatalog::new(
            config.catalog.static_namespaces.iter().cloned(),
        )),
        CatalogSource::Database => {
            let catalog_pool = match &config.catalog.database_url {
                Some(url) => {
                    let options = url
                        .parse::<sqlx::postgres::PgConnectOptions>()
                        .context("Invalid catalog database URL")?;
                    sqlx::postgres::PgPoolOptions::new()
                        .max_connections(2)
                        .connect_lazy_with(options)
                }
                None => sandbox_pool.clone(),
            };
            Arc::new(
                PgNamespaceCatalog::new(catalog_pool, config.catalog.query.clone())
                    .with_timeout(Duration::from_secs(config.catalog.query_timeout_secs)),
            )
        }
    };
    Ok(catalog)
}
