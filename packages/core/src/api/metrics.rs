use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
};

use crate::error::AppError;
use crate::metrics::AppMetrics;

pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Prometheus scrape endpoint.
pub async fn metrics(State(metrics): State<Arc<AppMetrics>>) -> Result<Response, AppError> {
    let body = metrics.render()?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)
        .body(Body::from(body))
        .expect("metrics response should be valid"))
}
