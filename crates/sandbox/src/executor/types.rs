//! Sandbox executor types

use querybox_config::SandboxConfig;
use querybox_models::{SandboxError, SandboxResult};
use std::sync::Arc;
use std::time::Duration;

use super::session::ConnectionSource;
use crate::identifier::{validate_namespace, Namespace};
use crate::policy::StatementPolicy;
use crate::registry::NamespaceRegistry;

/// Execution limits
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Deadline for the whole request, acquisition included
    pub statement_timeout: Duration,
    /// Time the rollback may take beyond the deadline
    pub rollback_grace: Duration,
    pub fallback_schema: Namespace,
}

impl ExecutorConfig {
    pub fn from_config(config: &SandboxConfig) -> SandboxResult<Self> {
        let fallback_schema = validate_namespace(&config.fallback_schema).map_err(|e| {
            SandboxError::InvalidNamespace {
                namespace: config.fallback_schema.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            statement_timeout: Duration::from_secs(config.statement_timeout_secs),
            rollback_grace: Duration::from_millis(config.rollback_grace_ms),
            fallback_schema,
        })
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            statement_timeout: Duration::from_secs(10),
            rollback_grace: Duration::from_secs(2),
            fallback_schema: Namespace::public(),
        }
    }
}

/// Runs caller statements inside always-rolled-back transactions
pub struct SandboxExecutor<S: ConnectionSource> {
    pub(super) source: S,
    pub(super) registry: Arc<NamespaceRegistry>,
    pub(super) policy: StatementPolicy,
    pub(super) config: ExecutorConfig,
}

impl<S: ConnectionSource> SandboxExecutor<S> {
    pub fn new(
        source: S,
        registry: Arc<NamespaceRegistry>,
        policy: StatementPolicy,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            source,
            registry,
            policy,
            config,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

}
