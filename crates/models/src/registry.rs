use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one successful registry load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Namespaces now registered
    pub accepted: usize,
    /// Catalog values skipped because they are not valid identifiers
    pub rejected: Vec<String>,
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
}

/// Point-in-time view of the registry for health reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatus {
    pub loaded: bool,
    pub namespace_count: usize,
    pub generation: u64,
    pub last_loaded_at: Option<DateTime<Utc>>,
}
