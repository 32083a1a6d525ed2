//! Payload normalization
//!
//! The metrics endpoints return one of two shapes:
//! - tabular: a map of metric key to `{ data: { cols, rows }, hints }`
//! - snapshot: load balancer state with `frontends` and `backends` arrays
//!
//! Payloads are classified into [`RawPayload`] up front and both variants are
//! normalized into the tabular [`MetricsResponse`].

mod snapshot;

pub use snapshot::convert_snapshot;

use crate::error::{ReceiverError, Result};
use crate::models::{MetricsResponse, ResourceType};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// Top-level arrays that mark a load balancer snapshot
const SNAPSHOT_SECTIONS: [&str; 2] = ["frontends", "backends"];

/// A fetched payload tagged with its wire shape
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Tabular(Value),
    Snapshot(Value),
}

impl RawPayload {
    /// Classify a decoded response body. Only load balancers produce snapshots.
    pub fn classify(resource_type: ResourceType, payload: Value) -> Self {
        if resource_type == ResourceType::ManagedLoadBalancer && is_snapshot(&payload) {
            RawPayload::Snapshot(payload)
        } else {
            RawPayload::Tabular(payload)
        }
    }

    /// Convert into the canonical tabular shape.
    ///
    /// `fetched_at` is used wherever the payload carries no usable timestamp.
    pub fn normalize(self, fetched_at: DateTime<Utc>) -> Result<MetricsResponse> {
        match self {
            RawPayload::Tabular(payload) => normalize_tabular(payload),
            RawPayload::Snapshot(payload) => convert_snapshot(&payload, fetched_at),
        }
    }
}

fn is_snapshot(payload: &Value) -> bool {
    payload.as_object().is_some_and(|root| {
        SNAPSHOT_SECTIONS
            .iter()
            .any(|section| root.get(*section).is_some_and(Value::is_array))
    })
}

fn normalize_tabular(payload: Value) -> Result<MetricsResponse> {
    let mut parsed: MetricsResponse = serde_json::from_value(payload)
        .map_err(|e| ReceiverError::Decode(format!("unmarshal metrics response: {}", e)))?;

    parsed.retain(|key, item| {
        let usable = item.data.cols.len() >= 2 && !item.data.rows.is_empty();
        if !usable {
            debug!(
                metric = %key,
                cols = item.data.cols.len(),
                rows = item.data.rows.len(),
                "Dropping metric without data columns or rows"
            );
        }
        usable
    });

    Ok(parsed)
}

/// Coerce a JSON cell to a float. Accepts numbers and numeric strings.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Parse an RFC 3339 timestamp, or a zone-less ISO 8601 one taken as UTC
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
