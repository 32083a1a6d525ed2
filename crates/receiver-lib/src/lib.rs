//! UpCloud managed service metrics receiver
//!
//! This crate provides:
//! - An authenticated client for the UpCloud metrics and listing endpoints
//! - Target resolution with discovery and exclusions
//! - Normalization of tabular and load balancer snapshot payloads
//! - Descriptor lookup and gauge emission
//! - A scheduled receiver with an explicit lifecycle
//! - Health checks, Prometheus self-metrics and ops endpoints

pub mod api;
pub mod client;
pub mod collector;
pub mod config;
pub mod consumer;
pub mod descriptor;
pub mod emitter;
pub mod error;
pub mod health;
pub mod models;
pub mod normalize;
pub mod observability;
pub mod resolver;

pub use client::{UpCloudApi, UpCloudClient};
pub use collector::{MetricsReceiver, MetricsReceiverBuilder, ReceiverState};
pub use config::ReceiverConfig;
pub use consumer::{ChannelConsumer, JsonLinesConsumer, MetricsConsumer};
pub use error::{ReceiverError, Result, ScrapeErrors};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ReceiverMetrics, StructuredLogger};
