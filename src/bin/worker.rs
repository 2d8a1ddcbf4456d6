use metrics_exporter_prometheus::PrometheusBuilder;
use render_queue::{
    config::AppConfig,
    routes,
    services::{
        queue::{JobStore, RedisJobStore},
        renderer::{ChromeRenderer, RendererSettings},
        storage::ArtifactStore,
    },
    shutdown,
    worker::RenderWorker,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting render worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    if let Some(addr) = config.worker_metrics_addr.as_deref() {
        let addr: SocketAddr = addr.parse().expect("Invalid WORKER_METRICS_ADDR");
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("Failed to install Prometheus exporter");
        routes::metrics::describe_metrics();
        tracing::info!(%addr, "Serving worker metrics");
    }

    tracing::info!("Connecting to Redis");
    let queue = RedisJobStore::connect(&config.redis_url())
        .await
        .expect("Failed to connect to Redis job queue");
    queue.ping().await.expect("Redis did not answer PING");

    let renderer = ChromeRenderer::new(RendererSettings::from_config(&config));
    let storage = ArtifactStore::new(config.output_dir.clone());

    let worker = RenderWorker::new(
        RenderWorker::generate_id(),
        Arc::new(queue),
        Arc::new(renderer),
        storage,
        config.lease_ttl(),
    );

    tracing::info!(
        worker = worker.id(),
        output_dir = %config.output_dir.display(),
        "Worker configured"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown::signal().await;
        tracing::info!("Finishing current job before exit");
        let _ = stop_tx.send(true);
    });

    worker.run(config.poll_interval(), stop_rx).await;
}
