//! Sandbox executor modules

mod execute;
mod session;
mod types;
mod utils;

pub use session::{
    ConnectionSource, PgConnectionSource, PgSandboxConnection, PoolStatus, SandboxConnection,
};
pub use types::{ExecutorConfig, SandboxExecutor};
