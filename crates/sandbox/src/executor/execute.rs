//! Sandboxed statement execution
//!
//! Every request follows the same path: validate the namespace, check the
//! registry, screen the statement, then acquire a connection and run the
//! statement inside a transaction that is always rolled back. Validation
//! failures return before the pool is touched. Once a connection is held,
//! every exit goes through rollback and release.

use querybox_models::{ExecutionResult, ExecutionStage, SandboxError, SandboxResult};
use std::time::Instant;
use tokio::time::error::Elapsed;
use tokio::time::{timeout, timeout_at, Instant as Deadline};
use tracing::{debug, warn};
use uuid::Uuid;

use super::session::{ConnectionSource, SandboxConnection};
use super::utils::{connection_survives, describe_sqlx_error};
use super::SandboxExecutor;
use crate::identifier::{validate_namespace, Namespace};
use crate::policy::PolicyDecision;

/// Failure of one database round trip
enum StepError {
    Database(sqlx::Error),
    TimedOut(&'static str),
}

/// Connection held by one request.
///
/// Dropped before `settled` is set (the request future was cancelled
/// mid-flight), the connection is marked broken so its release closes it
/// and the server aborts the open transaction.
struct HeldConnection<C: SandboxConnection> {
    request_id: Uuid,
    conn: C,
    settled: bool,
}

impl<C: SandboxConnection> HeldConnection<C> {
    fn new(request_id: Uuid, conn: C) -> Self {
        Self {
            request_id,
            conn,
            settled: false,
        }
    }
}

impl<C: SandboxConnection> Drop for HeldConnection<C> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                request_id = %self.request_id,
                "Sandbox request cancelled before rollback, discarding connection"
            );
            self.conn.mark_broken();
        }
    }
}

impl<S: ConnectionSource> SandboxExecutor<S> {
    /// Execute one caller statement against `namespace` and discard its effects
    pub async fn execute(&self, sql: &str, namespace: &str) -> SandboxResult<ExecutionResult> {
        let start_time = Instant::now();
        let request_id = Uuid::new_v4();
        let deadline = Deadline::now() + self.config.statement_timeout;

        trace_stage(request_id, ExecutionStage::Received);

        let outcome = match self.check_request(request_id, sql, namespace).await {
            Ok(namespace) => self.run_sandboxed(request_id, sql, &namespace, deadline).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(mut result) => {
                result.execution_time_ms = start_time.elapsed().as_millis() as u64;
                debug!(
                    %request_id,
                    stage = %ExecutionStage::Completed,
                    rows = result.rows.len(),
                    row_count = result.row_count,
                    elapsed_ms = result.execution_time_ms,
                    "Sandbox request completed"
                );
                Ok(result)
            }
            Err(e) => {
                debug!(
                    %request_id,
                    stage = %ExecutionStage::Failed,
                    kind = e.kind(),
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "Sandbox request failed"
                );
                Err(e)
            }
        }
    }

    /// Namespace grammar, registry membership and statement policy.
    ///
    /// Nothing here touches the connection pool.
    async fn check_request(
        &self,
        request_id: Uuid,
        sql: &str,
        namespace: &str,
    ) -> SandboxResult<Namespace> {
        let namespace =
            validate_namespace(namespace).map_err(|e| SandboxError::InvalidNamespace {
                namespace: namespace.to_string(),
                reason: e.to_string(),
            })?;
        trace_stage(request_id, ExecutionStage::NamespaceValidated);

        let snapshot = self.registry.snapshot().await;
        if !snapshot.is_loaded() {
            debug!(%request_id, %namespace, "Registry not loaded, using grammar-only validation");
        } else if !snapshot.contains(namespace.as_str()) {
            return Err(SandboxError::UnknownNamespace {
                namespace: namespace.into_inner(),
            });
        }
        trace_stage(request_id, ExecutionStage::SchemaChecked);

        if sql.trim().is_empty() {
            return Err(SandboxError::InvalidStatement {
                reason: "statement cannot be empty".to_string(),
            });
        }

        if let PolicyDecision::Forbidden { keyword, reason } = self.policy.classify(sql) {
            warn!(%request_id, %namespace, %keyword, "Statement rejected by policy");
            return Err(SandboxError::ForbiddenOperation { reason });
        }
        trace_stage(request_id, ExecutionStage::PolicyChecked);

        Ok(namespace)
    }

    /// Acquire, run inside a transaction, roll back, release
    async fn run_sandboxed(
        &self,
        request_id: Uuid,
        sql: &str,
        namespace: &Namespace,
        deadline: Deadline,
    ) -> SandboxResult<ExecutionResult> {
        let conn = match timeout_at(deadline, self.source.acquire()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                warn!(%request_id, error = %e, "Failed to acquire sandbox connection");
                return Err(SandboxError::PoolExhausted {
                    reason: describe_sqlx_error(&e),
                });
            }
            Err(_) => {
                warn!(%request_id, "Timed out waiting for a sandbox connection");
                return Err(SandboxError::PoolExhausted {
                    reason: "timed out waiting for a free connection".to_string(),
                });
            }
        };
        trace_stage(request_id, ExecutionStage::ConnectionAcquired);

        // If this future is dropped from here on, the guard discards the
        // connection instead of pooling an open transaction
        let mut held = HeldConnection::new(request_id, conn);

        let outcome = self
            .run_statement(request_id, &mut held.conn, sql, namespace, deadline)
            .await;

        // Rollback runs on every path; its failure is logged, never returned
        match timeout(self.config.rollback_grace, held.conn.rollback()).await {
            Ok(Ok(())) => trace_stage(request_id, ExecutionStage::RolledBack),
            Ok(Err(e)) => {
                debug!(%request_id, error = %e, "Rollback failed");
                if !connection_survives(&e) {
                    held.conn.mark_broken();
                }
            }
            Err(_) => {
                warn!(%request_id, "Rollback timed out");
                held.conn.mark_broken();
            }
        }

        held.settled = true;
        drop(held);
        trace_stage(request_id, ExecutionStage::ConnectionReleased);

        outcome.map_err(|e| match e {
            StepError::Database(e) => SandboxError::StatementExecution {
                message: describe_sqlx_error(&e),
            },
            StepError::TimedOut(step) => SandboxError::StatementExecution {
                message: format!(
                    "{} exceeded the {}s execution deadline",
                    step,
                    self.config.statement_timeout.as_secs()
                ),
            },
        })
    }

    /// BEGIN, scope the search path, run the caller's statement
    async fn run_statement(
        &self,
        request_id: Uuid,
        conn: &mut S::Connection,
        sql: &str,
        namespace: &Namespace,
        deadline: Deadline,
    ) -> Result<ExecutionResult, StepError> {
        let outcome = timeout_at(deadline, conn.begin()).await;
        settle(conn, outcome, "BEGIN")?;
        trace_stage(request_id, ExecutionStage::InTransaction);

        let outcome = timeout_at(
            deadline,
            conn.set_search_path(namespace, &self.config.fallback_schema),
        )
        .await;
        settle(conn, outcome, "search path")?;

        let outcome = timeout_at(deadline, conn.run(sql)).await;
        let result = settle(conn, outcome, "statement")?;
        trace_stage(request_id, ExecutionStage::Executed);

        Ok(result)
    }
}

/// Classify the outcome of one deadline-bounded round trip.
///
/// A connection that timed out or failed below the SQL layer is marked
/// broken so it is discarded on release.
fn settle<C, T>(
    conn: &mut C,
    outcome: Result<Result<T, sqlx::Error>, Elapsed>,
    step: &'static str,
) -> Result<T, StepError>
where
    C: SandboxConnection,
{
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            if !connection_survives(&e) {
                conn.mark_broken();
            }
            Err(StepError::Database(e))
        }
        Err(_) => {
            conn.mark_broken();
            Err(StepError::TimedOut(step))
        }
    }
}

fn trace_stage(request_id: Uuid, stage: ExecutionStage) {
    debug!(%request_id, %stage, "Sandbox request stage");
}
