//! Prometheus self-metrics and structured lifecycle logging

use crate::models::ResourceType;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge_vec,
    Histogram, IntCounter, IntCounterVec, IntGaugeVec,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info};

/// Scrape cycles wait on remote calls, so buckets run up to a minute
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<ReceiverMetricsInner> = OnceLock::new();

struct ReceiverMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_total: IntCounter,
    scrape_errors_total: IntCounterVec,
    targets_scraped: IntGaugeVec,
    data_points_emitted_total: IntCounter,
    batches_forwarded_total: IntCounter,
}

impl ReceiverMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "upcloud_receiver_cycle_duration_seconds",
                "Wall time of one scrape cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_total: register_int_counter!(
                "upcloud_receiver_cycles_total",
                "Completed scrape cycles"
            )
            .expect("Failed to register cycles_total"),

            scrape_errors_total: register_int_counter_vec!(
                "upcloud_receiver_scrape_errors_total",
                "Errors reported by scrape cycles",
                &["resource_type"]
            )
            .expect("Failed to register scrape_errors_total"),

            targets_scraped: register_int_gauge_vec!(
                "upcloud_receiver_targets_scraped",
                "Targets scraped successfully in the last cycle",
                &["resource_type"]
            )
            .expect("Failed to register targets_scraped"),

            data_points_emitted_total: register_int_counter!(
                "upcloud_receiver_data_points_emitted_total",
                "Data points handed to the consumer"
            )
            .expect("Failed to register data_points_emitted_total"),

            batches_forwarded_total: register_int_counter!(
                "upcloud_receiver_batches_forwarded_total",
                "Batches accepted by the consumer"
            )
            .expect("Failed to register batches_forwarded_total"),
        }
    }
}

/// Handle to the process-wide receiver metrics. Clones share one registry entry.
#[derive(Clone)]
pub struct ReceiverMetrics {
    _private: (),
}

impl Default for ReceiverMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ReceiverMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ReceiverMetricsInner {
        GLOBAL_METRICS.get_or_init(ReceiverMetricsInner::new)
    }

    pub fn observe_cycle(&self, elapsed: Duration) {
        self.inner()
            .cycle_duration_seconds
            .observe(elapsed.as_secs_f64());
        self.inner().cycles_total.inc();
    }

    /// Errors not tied to a resource type are recorded under `unknown`
    pub fn inc_scrape_errors(&self, resource_type: Option<ResourceType>, count: u64) {
        let label = resource_type.map(|rt| rt.as_str()).unwrap_or("unknown");
        self.inner()
            .scrape_errors_total
            .with_label_values(&[label])
            .inc_by(count);
    }

    pub fn set_targets_scraped(&self, resource_type: ResourceType, count: i64) {
        self.inner()
            .targets_scraped
            .with_label_values(&[resource_type.as_str()])
            .set(count);
    }

    pub fn record_forwarded(&self, data_points: u64) {
        self.inner().batches_forwarded_total.inc();
        self.inner().data_points_emitted_total.inc_by(data_points);
    }
}

/// Event-tagged log lines for receiver lifecycle and cycle outcomes
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, interval: Duration, enabled: &[ResourceType]) {
        let enabled: Vec<&str> = enabled.iter().map(|rt| rt.as_str()).collect();
        info!(
            event = "receiver_started",
            instance = %self.instance,
            receiver_version = %version,
            interval_secs = interval.as_secs(),
            resource_types = ?enabled,
            "UpCloud receiver started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "receiver_shutdown",
            instance = %self.instance,
            reason = %reason,
            "UpCloud receiver shutting down"
        );
    }

    pub fn log_cycle(&self, resources: usize, data_points: usize, errors: usize, elapsed: Duration) {
        info!(
            event = "scrape_cycle",
            instance = %self.instance,
            resources = resources,
            data_points = data_points,
            errors = errors,
            elapsed_ms = elapsed.as_millis() as u64,
            "Scrape cycle complete"
        );
    }

    pub fn log_cycle_errors(&self, errors: &str) {
        error!(
            event = "scrape_errors",
            instance = %self.instance,
            errors = %errors,
            "UpCloud scrape completed with errors"
        );
    }
}
