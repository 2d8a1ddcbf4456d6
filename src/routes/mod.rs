pub mod error;
pub mod health;
pub mod metrics;
pub mod render;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// HTML documents travel inline in the request body.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Gateway routes with the standard middleware stack. `/metrics` is only
/// mounted when a Prometheus recorder has been installed.
pub fn router(state: AppState, prometheus: Option<Arc<PrometheusHandle>>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/render", post(render::submit_render))
        .route("/api/v1/status/{id}", get(render::get_job_status))
        .route("/api/v1/download/{id}", get(render::download))
        .with_state(state);

    if let Some(handle) = prometheus {
        app = app.route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(handle),
        );
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}
