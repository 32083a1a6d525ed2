//! Core data models for the receiver

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Managed service families the receiver knows how to scrape
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Managed database services, listed through a paginated endpoint
    ManagedDatabase,
    /// Managed load balancers, listed in a single response
    ManagedLoadBalancer,
}

impl ResourceType {
    /// Scrape order within a cycle
    pub const ALL: [ResourceType; 2] = [
        ResourceType::ManagedDatabase,
        ResourceType::ManagedLoadBalancer,
    ];

    /// Identifier used in metric names and resource attributes
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::ManagedDatabase => "managed_database",
            ResourceType::ManagedLoadBalancer => "managed_load_balancer",
        }
    }

    /// Human-readable name used in error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceType::ManagedDatabase => "managed database",
            ResourceType::ManagedLoadBalancer => "managed load balancer",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resource to scrape in a cycle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub resource_type: ResourceType,
    /// Trimmed, non-empty identifier
    pub uuid: String,
}

impl Target {
    pub fn new(resource_type: ResourceType, uuid: impl Into<String>) -> Self {
        Self {
            resource_type,
            uuid: uuid.into(),
        }
    }
}

/// Canonical tabular payload: raw metric key to its time series table
pub type MetricsResponse = BTreeMap<String, MetricsItem>;

/// One metric entry from the API response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsItem {
    #[serde(default)]
    pub data: MetricsData,
    #[serde(default)]
    pub hints: MetricsHints,
}

/// Columns and rows for one metric. The first column is the timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsData {
    #[serde(default)]
    pub cols: Vec<MetricsColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Column header. `label` names the series for value columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsColumn {
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl MetricsColumn {
    pub fn new(label: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: kind.into(),
        }
    }
}

/// Optional display metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsHints {
    #[serde(default)]
    pub title: String,
}

/// Output of one scrape cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricBatch {
    pub resource_metrics: Vec<ResourceMetrics>,
}

impl MetricBatch {
    /// True when no resource produced a record this cycle
    pub fn is_empty(&self) -> bool {
        self.resource_metrics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.resource_metrics.len()
    }

    /// Data points across every resource and metric
    pub fn data_point_count(&self) -> usize {
        self.resource_metrics
            .iter()
            .flat_map(|rm| rm.metrics.iter())
            .map(|m| m.data_points.len())
            .sum()
    }
}

/// Metrics for a single scraped resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceMetrics {
    /// Provider, resource type and uuid
    pub attributes: BTreeMap<String, String>,
    /// Instrumentation scope name
    pub scope: String,
    pub metrics: Vec<Metric>,
}

/// A gauge metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    /// Descriptor name, e.g. `upcloud.managed_database.cpu.utilization`
    pub name: String,
    pub description: String,
    pub unit: String,
    pub data_points: Vec<DataPoint>,
}

/// One normalized gauge sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Raw metric key, series label and any normalization applied
    pub attributes: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_names() {
        assert_eq!(ResourceType::ManagedDatabase.as_str(), "managed_database");
        assert_eq!(
            ResourceType::ManagedLoadBalancer.to_string(),
            "managed_load_balancer"
        );
        assert_eq!(
            ResourceType::ManagedLoadBalancer.display_name(),
            "managed load balancer"
        );
    }

    #[test]
    fn test_metrics_item_decodes_without_hints() {
        let item: MetricsItem = serde_json::from_value(serde_json::json!({
            "data": {
                "cols": [{"label": "time", "type": "date"}, {"label": "primary"}],
                "rows": [["2026-02-21T08:00:00Z", 1]]
            }
        }))
        .unwrap();

        assert_eq!(item.data.cols.len(), 2);
        assert_eq!(item.data.cols[0].kind, "date");
        assert_eq!(item.data.cols[1].kind, "");
        assert!(item.hints.title.is_empty());
    }

    #[test]
    fn test_batch_counts() {
        let batch = MetricBatch::default();
        assert!(batch.is_empty());
        assert_eq!(batch.data_point_count(), 0);
    }
}
