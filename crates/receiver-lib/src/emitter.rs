//! Builds gauge records for one scraped resource

use crate::descriptor::descriptor_for_metric;
use crate::models::{DataPoint, Metric, MetricsItem, MetricsResponse, ResourceMetrics, Target};
use crate::normalize::{coerce_f64, parse_timestamp};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

pub const INSTRUMENTATION_SCOPE: &str = "upcloud-receiver";
pub const PROVIDER: &str = "upcloud";

pub const ATTR_CLOUD_PROVIDER: &str = "cloud.provider";
pub const ATTR_RESOURCE_TYPE: &str = "upcloud.resource.type";
pub const ATTR_RESOURCE_UUID: &str = "upcloud.resource.uuid";
pub const ATTR_METRIC_NAME: &str = "upcloud.metric.name";
pub const ATTR_SERIES: &str = "upcloud.series";
pub const ATTR_NORMALIZATION: &str = "upcloud.value.normalization";
pub const NORMALIZATION_PERCENT_TO_RATIO: &str = "percent_to_ratio";

/// Raw metric keys allowed through; empty allows every key
#[derive(Debug, Clone, Default)]
pub struct Allowlist(HashSet<String>);

impl Allowlist {
    pub fn new(keys: &[String]) -> Self {
        Self(
            keys.iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn allows(&self, metric_key: &str) -> bool {
        self.0.is_empty() || self.0.contains(metric_key)
    }
}

/// Build the resource record for one target from its normalized payload.
///
/// Only the last row of each table is emitted. `fetched_at` stands in for
/// rows whose timestamp cell is missing or unparsable.
pub fn build_resource_metrics(
    target: &Target,
    payload: &MetricsResponse,
    allowlist: &Allowlist,
    fetched_at: DateTime<Utc>,
) -> ResourceMetrics {
    let mut attributes = BTreeMap::new();
    attributes.insert(ATTR_CLOUD_PROVIDER.to_string(), PROVIDER.to_string());
    attributes.insert(
        ATTR_RESOURCE_TYPE.to_string(),
        target.resource_type.as_str().to_string(),
    );
    attributes.insert(ATTR_RESOURCE_UUID.to_string(), target.uuid.clone());

    let metrics = payload
        .iter()
        .filter(|(key, _)| allowlist.allows(key))
        .filter_map(|(key, item)| build_metric(target, key, item, fetched_at))
        .collect();

    ResourceMetrics {
        attributes,
        scope: INSTRUMENTATION_SCOPE.to_string(),
        metrics,
    }
}

fn build_metric(
    target: &Target,
    metric_key: &str,
    item: &MetricsItem,
    fetched_at: DateTime<Utc>,
) -> Option<Metric> {
    let cols = &item.data.cols;
    if cols.len() < 2 {
        return None;
    }
    let row = item.data.rows.last()?;
    if row.len() < 2 {
        return None;
    }

    let timestamp = parse_timestamp(&row[0]).unwrap_or(fetched_at);
    let descriptor = descriptor_for_metric(target.resource_type, metric_key);

    let mut data_points = Vec::with_capacity(cols.len() - 1);
    for (idx, (col, cell)) in cols.iter().zip(row.iter()).enumerate().skip(1) {
        let Some(raw) = coerce_f64(cell) else {
            debug!(
                metric = %metric_key,
                column = idx,
                uuid = %target.uuid,
                "Skipping non-numeric metric value"
            );
            continue;
        };

        let mut attributes = BTreeMap::new();
        attributes.insert(ATTR_METRIC_NAME.to_string(), metric_key.to_string());
        attributes.insert(ATTR_SERIES.to_string(), col.label.clone());
        if descriptor.percent_to_ratio {
            attributes.insert(
                ATTR_NORMALIZATION.to_string(),
                NORMALIZATION_PERCENT_TO_RATIO.to_string(),
            );
        }

        data_points.push(DataPoint {
            timestamp,
            value: descriptor.normalize_value(raw),
            attributes,
        });
    }

    Some(Metric {
        name: descriptor.name,
        description: item.hints.title.clone(),
        unit: descriptor.unit,
        data_points,
    })
}
