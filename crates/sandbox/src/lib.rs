//! Sandboxed SQL execution against tenant schemas
//!
//! Caller statements run inside a transaction scoped to one tenant namespace
//! and are always rolled back, so nothing executed through this crate
//! persists. Requests are screened before a connection is taken: the
//! namespace must match a strict identifier grammar and, once the registry
//! has loaded, be registered; the statement must pass a keyword deny-list.

pub mod catalog;
mod executor;
mod gateway;
pub mod identifier;
pub mod policy;
pub mod pool;
pub mod registry;

pub use catalog::{NamespaceCatalog, PgNamespaceCatalog, StaticNamespaceCatalog};
pub use executor::{
    ConnectionSource, ExecutorConfig, PgConnectionSource, PgSandboxConnection, PoolStatus,
    SandboxConnection, SandboxExecutor,
};
pub use gateway::SandboxGateway;
pub use identifier::{validate_namespace, InvalidIdentifier, Namespace};
pub use policy::{PolicyDecision, StatementPolicy};
pub use registry::{NamespaceRegistry, RegistrySnapshot};

pub use querybox_models::{ExecutionRequest, ExecutionResult, SandboxError, SandboxResult};
