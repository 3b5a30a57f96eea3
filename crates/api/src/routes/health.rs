use axum::{extract::State, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use querybox_models::RegistryStatus;
use querybox_sandbox::PoolStatus;
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// Create health router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/ping", get(ping))
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// `ok` once the registry has loaded, `degraded` before that
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub environment: String,
    pub uptime: String,
    pub registry: RegistryStatus,
    pub pool: PoolStatus,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let registry = state.gateway.registry_status().await;
    let status = if registry.loaded { "ok" } else { "degraded" };

    Json(HealthStatus {
        status: status.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.to_string(),
        uptime: format!("{}s", state.uptime_secs()),
        registry,
        pool: state.gateway.pool_status(),
    })
}

/// Keep-alive endpoint
pub async fn ping() -> Json<Value> {
    Json(json!({
        "ok": true,
        "ts": Utc::now().timestamp_millis()
    }))
}
