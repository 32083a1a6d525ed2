//! Receiver lifecycle and scheduling loop
//!
//! The receiver moves through `idle -> running -> stopping -> stopped`. One
//! background task runs the first cycle right after the initial delay, then
//! one cycle per tick. Cycles never overlap; a tick that arrives while a cycle
//! is still running is merged into the next one.

use super::scrape::{ScrapeOutcome, Scraper};
use crate::client::UpCloudApi;
use crate::config::ReceiverConfig;
use crate::consumer::MetricsConsumer;
use crate::error::{ReceiverError, Result, ScrapeErrors};
use crate::health::{components, HealthRegistry};
use crate::models::ResourceType;
use crate::observability::{ReceiverMetrics, StructuredLogger};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Running,
    /// Shutdown requested, waiting for the loop task to exit
    Stopping,
    Stopped,
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReceiverState::Idle => "idle",
            ReceiverState::Running => "running",
            ReceiverState::Stopping => "stopping",
            ReceiverState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Result of one scrape-and-forward cycle
#[derive(Debug)]
pub struct CycleReport {
    pub resources: usize,
    pub data_points: usize,
    pub errors: ScrapeErrors,
    /// Whether a batch was handed to the consumer and accepted
    pub forwarded: bool,
}

/// Runs a single cycle and reports it to health, metrics and logs
struct CycleRunner {
    scraper: Scraper,
    consumer: Arc<dyn MetricsConsumer>,
    health: HealthRegistry,
    metrics: ReceiverMetrics,
    logger: StructuredLogger,
}

impl CycleRunner {
    async fn run(&self) -> CycleReport {
        let start = Instant::now();
        let ScrapeOutcome {
            batch,
            errors,
            scraped,
        } = self.scraper.scrape().await;
        let elapsed = start.elapsed();

        self.metrics.observe_cycle(elapsed);
        for (resource_type, count) in &scraped {
            self.metrics.set_targets_scraped(*resource_type, *count as i64);
        }
        for err in &errors {
            self.metrics.inc_scrape_errors(err.resource_type(), 1);
        }

        let errors = ScrapeErrors(errors);
        self.report_scrape_health(&errors, !batch.is_empty()).await;
        if !errors.is_empty() {
            self.logger.log_cycle_errors(&errors.to_string());
        }

        let resources = batch.len();
        let data_points = batch.data_point_count();
        self.logger
            .log_cycle(resources, data_points, errors.len(), elapsed);

        if batch.is_empty() {
            debug!("No resource records this cycle, nothing to forward");
            return CycleReport {
                resources,
                data_points,
                errors,
                forwarded: false,
            };
        }

        let forwarded = match self.consumer.consume(batch).await {
            Ok(()) => {
                self.metrics.record_forwarded(data_points as u64);
                self.health.set_healthy(components::CONSUMER).await;
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to forward metric batch");
                self.health
                    .set_degraded(components::CONSUMER, e.to_string())
                    .await;
                false
            }
        };

        CycleReport {
            resources,
            data_points,
            errors,
            forwarded,
        }
    }

    /// Rejected credentials with nothing scraped mark the API client
    /// unhealthy. Any other error only degrades.
    async fn report_scrape_health(&self, errors: &ScrapeErrors, scraped_any: bool) {
        if errors.is_empty() {
            self.health.set_healthy(components::SCRAPER).await;
            self.health.set_healthy(components::API_CLIENT).await;
            return;
        }

        self.health
            .set_degraded(components::SCRAPER, errors.to_string())
            .await;

        let api_failures: Vec<String> = errors
            .iter()
            .filter(|e| e.is_api_failure())
            .map(|e| e.to_string())
            .collect();
        if api_failures.is_empty() {
            self.health.set_healthy(components::API_CLIENT).await;
        } else if !scraped_any && errors.iter().all(ReceiverError::is_auth_rejection) {
            self.health
                .set_unhealthy(
                    components::API_CLIENT,
                    format!("credentials rejected: {}", api_failures.join("; ")),
                )
                .await;
        } else {
            self.health
                .set_degraded(components::API_CLIENT, api_failures.join("; "))
                .await;
        }
    }
}

/// Timing settings for the scheduling loop
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub interval: Duration,
    pub initial_delay: Duration,
}

impl From<&ReceiverConfig> for LoopSettings {
    fn from(config: &ReceiverConfig) -> Self {
        Self {
            interval: config.collection_interval,
            initial_delay: config.initial_delay,
        }
    }
}

/// Scheduled UpCloud metrics receiver
pub struct MetricsReceiver {
    runner: Arc<CycleRunner>,
    settings: LoopSettings,
    enabled: Vec<ResourceType>,
    state: Arc<watch::Sender<ReceiverState>>,
    shutdown_tx: broadcast::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl MetricsReceiver {
    pub fn state(&self) -> ReceiverState {
        *self.state.borrow()
    }

    /// Watch state changes, including the loop task's final `stopped`
    pub fn subscribe_state(&self) -> watch::Receiver<ReceiverState> {
        self.state.subscribe()
    }

    /// Run one cycle outside the schedule
    pub async fn run_once(&self) -> CycleReport {
        self.runner.run().await
    }

    /// Spawn the scheduling loop. Only valid from `idle`.
    pub async fn start(&mut self) -> Result<()> {
        let mut previous = ReceiverState::Idle;
        let started = self.state.send_if_modified(|state| {
            previous = *state;
            if *state == ReceiverState::Idle {
                *state = ReceiverState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ReceiverError::InvalidState {
                action: "start",
                state: previous.to_string(),
            });
        }

        self.runner.logger.log_startup(
            env!("CARGO_PKG_VERSION"),
            self.settings.interval,
            &self.enabled,
        );
        self.runner.health.set_ready(true).await;

        let runner = Arc::clone(&self.runner);
        let settings = self.settings.clone();
        let state = Arc::clone(&self.state);
        let shutdown_rx = self.shutdown_tx.subscribe();

        self.handle = Some(tokio::spawn(async move {
            run_loop(&runner, &settings, shutdown_rx).await;
            runner.health.set_ready(false).await;
            state.send_replace(ReceiverState::Stopped);
            info!("Receiver loop stopped");
        }));

        Ok(())
    }

    /// Request cancellation and wait up to `deadline` for the loop to exit.
    ///
    /// A receiver that never started moves straight to `stopped`. On timeout
    /// the receiver stays in `stopping` and shutdown may be called again.
    pub async fn shutdown(&mut self, deadline: Duration) -> Result<()> {
        let mut previous = ReceiverState::Idle;
        self.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                ReceiverState::Idle => {
                    *state = ReceiverState::Stopped;
                    true
                }
                ReceiverState::Running => {
                    *state = ReceiverState::Stopping;
                    true
                }
                ReceiverState::Stopping | ReceiverState::Stopped => false,
            }
        });

        match previous {
            ReceiverState::Idle | ReceiverState::Stopped => return Ok(()),
            ReceiverState::Running => {
                self.runner.logger.log_shutdown("shutdown requested");
                let _ = self.shutdown_tx.send(());
            }
            ReceiverState::Stopping => {}
        }

        let Some(mut handle) = self.handle.take() else {
            self.state.send_replace(ReceiverState::Stopped);
            return Ok(());
        };

        match tokio::time::timeout(deadline, &mut handle).await {
            Ok(joined) => {
                if let Err(e) = joined {
                    error!(error = %e, "Receiver loop task failed");
                    self.state.send_replace(ReceiverState::Stopped);
                }
                Ok(())
            }
            Err(_) => {
                self.handle = Some(handle);
                Err(ReceiverError::ShutdownTimeout {
                    timeout_ms: deadline.as_millis() as u64,
                })
            }
        }
    }
}

impl Drop for MetricsReceiver {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run_loop(
    runner: &CycleRunner,
    settings: &LoopSettings,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!(
        interval_secs = settings.interval.as_secs(),
        initial_delay_ms = settings.initial_delay.as_millis() as u64,
        "Starting scrape loop"
    );

    if !settings.initial_delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(settings.initial_delay) => {}
            _ = shutdown.recv() => {
                info!("Shutdown during initial delay");
                return;
            }
        }
    }

    let mut ticker = interval_at(Instant::now() + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = runner.run() => {}
            _ = shutdown.recv() => {
                info!("Shutdown during scrape cycle, abandoning in-flight requests");
                break;
            }
        }

        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.recv() => {
                info!("Shutting down scrape loop");
                break;
            }
        }
    }
}

/// Builder for [`MetricsReceiver`]
pub struct MetricsReceiverBuilder {
    client: Option<Arc<dyn UpCloudApi>>,
    consumer: Option<Arc<dyn MetricsConsumer>>,
    config: ReceiverConfig,
    health: HealthRegistry,
    metrics: Option<ReceiverMetrics>,
    instance: String,
}

impl MetricsReceiverBuilder {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            client: None,
            consumer: None,
            config,
            health: HealthRegistry::new(),
            metrics: None,
            instance: "upcloud".to_string(),
        }
    }

    pub fn client(mut self, client: Arc<dyn UpCloudApi>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn consumer(mut self, consumer: Arc<dyn MetricsConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    /// Share a health registry with the ops endpoints
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn metrics(mut self, metrics: ReceiverMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Name attached to structured log events
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    /// Validate the configuration and assemble an idle receiver
    pub async fn build(self) -> Result<MetricsReceiver> {
        self.config.validate()?;
        let client = self
            .client
            .ok_or_else(|| ReceiverError::Config("an API client is required".to_string()))?;
        let consumer = self
            .consumer
            .ok_or_else(|| ReceiverError::Config("a metrics consumer is required".to_string()))?;

        self.health.register_all().await;

        let settings = LoopSettings::from(&self.config);
        let enabled = ResourceType::ALL
            .into_iter()
            .filter(|rt| self.config.resource(*rt).enabled)
            .collect();
        let (state, _) = watch::channel(ReceiverState::Idle);
        let (shutdown_tx, _) = broadcast::channel(1);

        let runner = CycleRunner {
            scraper: Scraper::new(client, Arc::new(self.config)),
            consumer,
            health: self.health,
            metrics: self.metrics.unwrap_or_default(),
            logger: StructuredLogger::new(self.instance),
        };

        Ok(MetricsReceiver {
            runner: Arc::new(runner),
            settings,
            enabled,
            state: Arc::new(state),
            shutdown_tx,
            handle: None,
        })
    }
}
