use querybox_config::AppConfig;
use querybox_sandbox::SandboxGateway;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<SandboxGateway>,
    pub config: Arc<AppConfig>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(gateway: SandboxGateway, config: AppConfig) -> Self {
        Self {
            gateway: Arc::new(gateway),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    /// Seconds since the state was created
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
