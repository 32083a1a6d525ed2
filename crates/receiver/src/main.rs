//! UpCloud receiver
//!
//! Polls UpCloud managed database and load balancer metrics on a fixed
//! interval and writes each cycle's batch as a JSON line on stdout.

use anyhow::{Context, Result};
use receiver_lib::{
    api::{self, OpsState},
    health::HealthRegistry,
    observability::{ReceiverMetrics, StructuredLogger},
    JsonLinesConsumer, MetricsReceiverBuilder, UpCloudClient,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs go to stderr, stdout carries the metric batches
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!("Starting upcloud-receiver");

    let config = config::AppConfig::load()?;
    config
        .receiver
        .validate()
        .context("invalid receiver configuration")?;
    info!(
        endpoint = %config.receiver.api.endpoint,
        interval_secs = config.receiver.collection_interval.as_secs(),
        "Receiver configured"
    );

    let client = UpCloudClient::new(
        &config.receiver.api,
        config
            .receiver
            .managed_load_balancers
            .metrics_path_template(),
    )
    .context("failed to build UpCloud API client")?;

    let health_registry = HealthRegistry::new();
    let metrics = ReceiverMetrics::new();
    let logger = StructuredLogger::new("upcloud");

    let ops_state = Arc::new(OpsState::new(health_registry.clone(), metrics.clone()));
    let ops_port = config.ops_port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(ops_port, ops_state).await {
            error!(error = %e, "Ops server exited");
        }
    });

    let mut receiver = MetricsReceiverBuilder::new(config.receiver)
        .client(Arc::new(client))
        .consumer(Arc::new(JsonLinesConsumer::stdout()))
        .health(health_registry)
        .metrics(metrics)
        .build()
        .await
        .context("failed to build receiver")?;

    receiver.start().await.context("failed to start receiver")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    logger.log_shutdown("SIGINT received");

    receiver
        .shutdown(SHUTDOWN_DEADLINE)
        .await
        .context("receiver shutdown")?;
    info!("Shutdown complete");

    Ok(())
}
