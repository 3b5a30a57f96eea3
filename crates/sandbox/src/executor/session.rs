//! Connection contract used by the executor, and its PostgreSQL
//! implementation on top of a `sqlx` pool.
//!
//! Releasing a connection is dropping it. A connection marked broken, or
//! one whose transaction was never rolled back, is detached from the pool
//! and closed on drop instead of being returned, so the pool never hands
//! out a connection with an unfinished transaction or an in-flight
//! statement.

use futures_util::TryStreamExt;
use querybox_models::{ExecutionResult, RowMap};
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgConnection;
use sqlx::{Column, Either, Executor, PgPool, Postgres, Statement};
use tracing::{debug, warn};

use super::utils::row_to_map;
use crate::identifier::{search_path, Namespace};

/// Pool occupancy for health reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub size: u32,
    pub idle: usize,
    pub max_connections: u32,
}

/// Bounded source of sandbox connections
#[async_trait::async_trait]
pub trait ConnectionSource: Send + Sync {
    type Connection: SandboxConnection;

    /// Wait for a free, health-checked connection
    async fn acquire(&self) -> Result<Self::Connection, sqlx::Error>;

    fn status(&self) -> PoolStatus {
        PoolStatus::default()
    }
}

/// One pooled connection, held for the duration of a single request
#[async_trait::async_trait]
pub trait SandboxConnection: Send {
    async fn begin(&mut self) -> Result<(), sqlx::Error>;

    /// Scope the open transaction's search path to `namespace, fallback`
    async fn set_search_path(
        &mut self,
        namespace: &Namespace,
        fallback: &Namespace,
    ) -> Result<(), sqlx::Error>;

    /// Run one caller statement and collect its result
    async fn run(&mut self, sql: &str) -> Result<ExecutionResult, sqlx::Error>;

    async fn rollback(&mut self) -> Result<(), sqlx::Error>;

    /// Discard instead of returning to the pool when released
    fn mark_broken(&mut self);
}

/// Connection source backed by a `PgPool`
#[derive(Clone)]
pub struct PgConnectionSource {
    pool: PgPool,
}

impl PgConnectionSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl ConnectionSource for PgConnectionSource {
    type Connection = PgSandboxConnection;

    async fn acquire(&self) -> Result<Self::Connection, sqlx::Error> {
        let conn = self.pool.acquire().await?;
        Ok(PgSandboxConnection {
            conn: Some(conn),
            broken: false,
            in_tx: false,
        })
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max_connections: self.pool.options().get_max_connections(),
        }
    }
}

/// Pooled PostgreSQL connection driving the sandbox transaction
pub struct PgSandboxConnection {
    conn: Option<PoolConnection<Postgres>>,
    broken: bool,
    /// Set before BEGIN is sent, cleared only by a successful ROLLBACK
    in_tx: bool,
}

impl PgSandboxConnection {
    fn inner(&mut self) -> Result<&mut PgConnection, sqlx::Error> {
        self.conn.as_deref_mut().ok_or(sqlx::Error::PoolClosed)
    }
}

#[async_trait::async_trait]
impl SandboxConnection for PgSandboxConnection {
    async fn begin(&mut self) -> Result<(), sqlx::Error> {
        self.in_tx = true;
        let conn = self.inner()?;
        sqlx::query("BEGIN").persistent(false).execute(conn).await?;
        Ok(())
    }

    async fn set_search_path(
        &mut self,
        namespace: &Namespace,
        fallback: &Namespace,
    ) -> Result<(), sqlx::Error> {
        let path = search_path(namespace, fallback);
        let conn = self.inner()?;
        // set_config(.., true) is SET LOCAL with the value bound as a parameter
        sqlx::query("SELECT set_config('search_path', $1, true)")
            .bind(path)
            .persistent(false)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn run(&mut self, sql: &str) -> Result<ExecutionResult, sqlx::Error> {
        let conn = self.inner()?;

        // Parse first so column names are known even when no row comes
        // back. Extended protocol: the server refuses more than one statement.
        let statement = (&mut *conn).prepare(sql).await?;
        let fields: Vec<String> = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        let mut stream = conn.fetch_many(statement.query());

        let mut rows: Vec<RowMap> = Vec::new();
        let mut row_count: u64 = 0;

        while let Some(step) = stream.try_next().await? {
            match step {
                Either::Left(done) => row_count += done.rows_affected(),
                Either::Right(row) => rows.push(row_to_map(&row)),
            }
        }

        debug!(rows = rows.len(), row_count, columns = fields.len(), "Statement completed");

        Ok(ExecutionResult {
            rows,
            row_count,
            fields,
            execution_time_ms: 0, // Will be set by caller
        })
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        let conn = self.inner()?;
        sqlx::query("ROLLBACK").persistent(false).execute(conn).await?;
        self.in_tx = false;
        Ok(())
    }

    fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Drop for PgSandboxConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.broken || self.in_tx {
                warn!(
                    broken = self.broken,
                    in_transaction = self.in_tx,
                    "Discarding sandbox connection"
                );
                // Dropping the detached connection closes the socket and
                // frees its pool slot; the server aborts the transaction.
                drop(conn.detach());
            }
        }
    }
}
