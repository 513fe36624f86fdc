//! HTTP endpoints served next to the scan loop.
//!
//! - `health`: liveness, version and metrics exposition

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod health;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/metrics", get(health::metrics_prometheus))
        .route("/metrics/json", get(health::metrics_json))
        .route("/version", get(health::version))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
