use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use render_queue::app_state::AppState;
use render_queue::config::AppConfig;
use render_queue::routes;
use render_queue::services::queue::{JobStore, RedisJobStore};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing render gateway");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    routes::metrics::describe_metrics();

    tracing::info!(redis_host = %config.redis_host, redis_port = config.redis_port, "Connecting to Redis job queue");
    let queue = RedisJobStore::connect(&config.redis_url())
        .await
        .expect("Failed to connect to Redis job queue");
    queue.ping().await.expect("Redis did not answer PING");

    let state = AppState::new(Arc::new(queue));
    let app = routes::router(state, Some(Arc::new(prometheus_handle)));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(render_queue::shutdown::signal())
        .await
        .expect("Server error");

    tracing::info!("Gateway stopped");
}
