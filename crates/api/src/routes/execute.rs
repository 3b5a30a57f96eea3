use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::post,
    Router,
};
use querybox_models::ExecutionRequest;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ApiResult;
use crate::state::AppState;

/// Create query execution router
pub fn create_router() -> Router<AppState> {
    Router::new().route("/api/execute", post(execute_query))
}

/// Run one statement in the sandbox; nothing it changes persists
pub async fn execute_query(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = payload?;

    info!(
        namespace = %request.namespace,
        sql_len = request.sql.len(),
        "Executing sandbox query"
    );

    match state.gateway.execute(&request).await {
        Ok(result) => {
            info!(
                namespace = %request.namespace,
                row_count = result.row_count,
                execution_time_ms = result.execution_time_ms,
                "Sandbox query completed"
            );
            Ok(Json(serde_json::json!({
                "success": true,
                "data": result
            })))
        }
        Err(e) => {
            if e.is_caller_error() {
                info!(namespace = %request.namespace, kind = e.kind(), "Sandbox query rejected");
            } else {
                warn!(namespace = %request.namespace, error = %e, "Sandbox query failed");
            }
            Err(e.into())
        }
    }
}
