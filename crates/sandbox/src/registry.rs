//! Process-wide registry of known tenant namespaces
//!
//! The registry publishes immutable snapshots. A load builds the next set
//! while readers keep using the current one, then swaps the `Arc` under a
//! write lock held only for the assignment. Loads are serialized so a slow
//! load can never publish over a newer one. Until the first successful
//! load the registry reports `loaded = false` and callers fall back to
//! grammar-only validation.

use chrono::{DateTime, Utc};
use querybox_models::{LoadReport, RegistryStatus, SandboxError, SandboxResult};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::catalog::NamespaceCatalog;
use crate::identifier::validate_namespace;

/// One published version of the registry
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    namespaces: HashSet<String>,
    loaded: bool,
    generation: u64,
    loaded_at: Option<DateTime<Utc>>,
}

impl RegistrySnapshot {
    pub fn contains(&self, name: &str) -> bool {
        self.namespaces.contains(name)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    /// Registered namespaces in sorted order
    pub fn namespaces(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.namespaces.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether a grammar-valid namespace may run against this snapshot
    pub fn admits(&self, name: &str) -> bool {
        !self.loaded || self.contains(name)
    }
}

/// Refreshable set of valid namespaces
#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    /// Held for the whole catalog read and publish
    loading: Mutex<()>,
}

impl NamespaceRegistry {
    /// Empty, never-loaded registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot; cheap to clone and safe to hold across awaits
    pub async fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().await.clone()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.snapshot().await.contains(name)
    }

    pub async fn is_loaded(&self) -> bool {
        self.snapshot().await.is_loaded()
    }

    pub async fn status(&self) -> RegistryStatus {
        let snapshot = self.snapshot().await;
        RegistryStatus {
            loaded: snapshot.is_loaded(),
            namespace_count: snapshot.len(),
            generation: snapshot.generation(),
            last_loaded_at: snapshot.loaded_at(),
        }
    }

    /// Reload from the catalog and publish the result atomically.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn load<C>(&self, catalog: &C) -> SandboxResult<LoadReport>
    where
        C: NamespaceCatalog + ?Sized,
    {
        let _loading = self.loading.lock().await;

        let values = catalog.distinct_namespaces().await.map_err(|e| {
            warn!(
                catalog = %catalog.describe(),
                error = %format!("{:#}", e),
                "Namespace registry load failed - keeping previous registry"
            );
            SandboxError::RegistryLoadFailed {
                reason: format!("{:#}", e),
            }
        })?;

        let mut namespaces = HashSet::with_capacity(values.len());
        let mut rejected = Vec::new();
        for value in values {
            match validate_namespace(&value) {
                Ok(namespace) => {
                    namespaces.insert(namespace.into_inner());
                }
                Err(e) => {
                    warn!(namespace = %value, reason = %e, "Skipping invalid catalog namespace");
                    rejected.push(value);
                }
            }
        }

        let loaded_at = Utc::now();
        let accepted = namespaces.len();
        let generation = {
            let mut current = self.current.write().await;
            let generation = current.generation + 1;
            *current = Arc::new(RegistrySnapshot {
                namespaces,
                loaded: true,
                generation,
                loaded_at: Some(loaded_at),
            });
            generation
        };

        info!(
            catalog = %catalog.describe(),
            accepted,
            rejected = rejected.len(),
            generation,
            "Namespace registry loaded"
        );

        Ok(LoadReport {
            accepted,
            rejected,
            generation,
            loaded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticNamespaceCatalog;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct FlakyCatalog {
        fail: AtomicBool,
        namespaces: Vec<String>,
    }

    #[async_trait::async_trait]
    impl NamespaceCatalog for FlakyCatalog {
        async fn distinct_namespaces(&self) -> anyhow::Result<Vec<String>> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("catalog unreachable");
            }
            Ok(self.namespaces.clone())
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    struct SlowCatalog {
        delay: Duration,
        namespaces: Vec<String>,
    }

    #[async_trait::async_trait]
    impl NamespaceCatalog for SlowCatalog {
        async fn distinct_namespaces(&self) -> anyhow::Result<Vec<String>> {
            tokio::time::sleep(self.delay).await;
            Ok(self.namespaces.clone())
        }

        fn describe(&self) -> String {
            "slow".to_string()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_loads_publish_in_start_order() {
        let registry = NamespaceRegistry::new();
        let stale = SlowCatalog {
            delay: Duration::from_millis(500),
            namespaces: vec!["asgn_old".to_string()],
        };
        let fresh = SlowCatalog {
            delay: Duration::ZERO,
            namespaces: vec!["asgn_new".to_string()],
        };

        let (first, second) = tokio::join!(registry.load(&stale), async {
            tokio::task::yield_now().await;
            registry.load(&fresh).await
        });

        assert_eq!(first.unwrap().generation, 1);
        assert_eq!(second.unwrap().generation, 2);
        assert!(registry.contains("asgn_new").await);
        assert!(!registry.contains("asgn_old").await);
    }

    #[tokio::test]
    async fn test_starts_unloaded() {
        let registry = NamespaceRegistry::new();
        assert!(!registry.is_loaded().await);
        assert!(!registry.contains("asgn_high_salary").await);
        assert!(registry.snapshot().await.admits("asgn_high_salary"));
    }

    #[tokio::test]
    async fn test_load_replaces_set() {
        let registry = NamespaceRegistry::new();

        let first = StaticNamespaceCatalog::new(["asgn_high_salary", "asgn_dept_count"]);
        let report = registry.load(&first).await.unwrap();
        assert_eq!(report.accepted, 2);
        assert_eq!(report.generation, 1);
        assert!(registry.contains("asgn_dept_count").await);

        let second = StaticNamespaceCatalog::new(["asgn_order_value"]);
        registry.load(&second).await.unwrap();
        assert!(!registry.contains("asgn_dept_count").await);
        assert!(registry.contains("asgn_order_value").await);
        assert_eq!(registry.status().await.generation, 2);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_snapshot() {
        let catalog = FlakyCatalog {
            fail: AtomicBool::new(false),
            namespaces: vec!["asgn_high_salary".to_string()],
        };
        let registry = NamespaceRegistry::new();
        registry.load(&catalog).await.unwrap();

        catalog.fail.store(true, Ordering::SeqCst);
        let err = registry.load(&catalog).await.unwrap_err();
        assert!(matches!(err, SandboxError::RegistryLoadFailed { .. }));

        assert!(registry.is_loaded().await);
        assert!(registry.contains("asgn_high_salary").await);
        assert_eq!(registry.status().await.generation, 1);
    }

    #[tokio::test]
    async fn test_failed_first_load_stays_degraded() {
        let catalog = FlakyCatalog {
            fail: AtomicBool::new(true),
            namespaces: Vec::new(),
        };
        let registry = NamespaceRegistry::new();
        assert!(registry.load(&catalog).await.is_err());
        assert!(!registry.is_loaded().await);
        assert!(registry.snapshot().await.admits("anything_valid"));
    }

    #[tokio::test]
    async fn test_invalid_catalog_values_are_skipped() {
        let registry = NamespaceRegistry::new();
        let catalog = StaticNamespaceCatalog::new(["asgn_ok", "Bad-Name", "x; DROP SCHEMA y"]);
        let report = registry.load(&catalog).await.unwrap();

        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected.len(), 2);
        assert!(registry.contains("asgn_ok").await);
        assert!(!registry.contains("Bad-Name").await);
    }

    #[tokio::test]
    async fn test_loaded_empty_catalog_rejects_everything() {
        let registry = NamespaceRegistry::new();
        registry
            .load(&StaticNamespaceCatalog::default())
            .await
            .unwrap();
        let snapshot = registry.snapshot().await;
        assert!(snapshot.is_loaded());
        assert!(!snapshot.admits("asgn_high_salary"));
    }

    #[tokio::test]
    async fn test_held_snapshot_is_unaffected_by_reload() {
        let registry = NamespaceRegistry::new();
        registry
            .load(&StaticNamespaceCatalog::new(["asgn_a"]))
            .await
            .unwrap();
        let held = registry.snapshot().await;

        registry
            .load(&StaticNamespaceCatalog::new(["asgn_b"]))
            .await
            .unwrap();

        assert!(held.contains("asgn_a"));
        assert!(!held.contains("asgn_b"));
        assert!(registry.contains("asgn_b").await);
    }
}
