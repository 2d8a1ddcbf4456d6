use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Prometheus scrape endpoint, text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the gateway and worker emit.
pub fn describe_metrics() {
    metrics::describe_counter!("render_jobs_submitted", "Total render jobs accepted by the gateway");
    metrics::describe_counter!("render_jobs_completed", "Total render jobs completed");
    metrics::describe_counter!("render_jobs_failed", "Total render jobs that failed");
    metrics::describe_counter!(
        "render_jobs_requeued",
        "Jobs put back in the queue after their worker's lease expired"
    );
    metrics::describe_histogram!(
        "render_processing_seconds",
        metrics::Unit::Seconds,
        "Time from claim to recorded outcome"
    );
    metrics::describe_gauge!("render_queue_depth", "Current number of pending jobs in the queue");
}
