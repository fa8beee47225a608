pub mod health;
pub mod metrics;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::metrics::AppMetrics;

/// Assemble the exporter's HTTP surface.
pub fn router(metrics: Arc<AppMetrics>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(metrics::metrics))
        .with_state(metrics)
        .layer(TraceLayer::new_for_http())
}
