use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod background;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Result<Router> {
    let cors = cors_layer(&state.config.server.frontend_url)?;

    let router = Router::new()
        .merge(routes::execute::create_router())
        .merge(routes::health::create_router())
        .merge(routes::registry::create_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}

/// CORS limited to the frontend origin
fn cors_layer(frontend_url: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(frontend_url.trim_end_matches('/'))
        .with_context(|| format!("Invalid FRONTEND_URL: {}", frontend_url))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}
