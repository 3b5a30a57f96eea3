use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Create namespace registry router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/registry", get(registry_status))
        .route("/api/registry/reload", post(reload_registry))
}

/// Current registry state
pub async fn registry_status(State(state): State<AppState>) -> Json<Value> {
    let status = state.gateway.registry_status().await;
    Json(serde_json::json!({
        "success": true,
        "data": status
    }))
}

/// Reload the registry from the catalog now.
///
/// Operator endpoint: requires `Authorization: Bearer <admin token>` and is
/// disabled when no admin token is configured.
pub async fn reload_registry(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    require_admin(&state, &headers)?;
    info!("Registry reload requested");
    let report = state.gateway.reload_registry().await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": report
    })))
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let expected = state.config.server.admin_token.as_deref().ok_or_else(|| {
        ApiError::Disabled("registry reload is disabled: no admin token configured".to_string())
    })?;

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            warn!("Registry reload without a bearer token");
            ApiError::Unauthorized("missing bearer token".to_string())
        })?;

    if token != expected {
        warn!("Registry reload with an invalid token");
        return Err(ApiError::Unauthorized("invalid admin token".to_string()));
    }

    Ok(())
}
