use querybox_sandbox::SandboxGateway;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

/// Start background task that keeps the namespace registry current.
///
/// Loads once immediately, then every `refresh_secs` (never again when 0).
/// Failed loads keep the previous registry and are retried on the next tick.
pub fn start_registry_refresh_task(gateway: Arc<SandboxGateway>, refresh_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(refresh_secs, "Starting namespace registry refresh task");

        if refresh_secs == 0 {
            refresh(&gateway).await;
            return;
        }

        let mut interval = interval(Duration::from_secs(refresh_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // First tick completes immediately
            interval.tick().await;
            refresh(&gateway).await;
        }
    })
}

async fn refresh(gateway: &SandboxGateway) {
    match gateway.reload_registry().await {
        Ok(report) => {
            if !report.rejected.is_empty() {
                warn!(rejected = ?report.rejected, "Catalog contains invalid namespaces");
            }
            info!(
                accepted = report.accepted,
                generation = report.generation,
                "Namespace registry refreshed"
            );
        }
        Err(e) => {
            let status = gateway.registry_status().await;
            warn!(
                error = %e,
                loaded = status.loaded,
                "Namespace registry refresh failed"
            );
        }
    }
}
