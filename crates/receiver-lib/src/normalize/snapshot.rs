//! Load balancer snapshot conversion
//!
//! A snapshot lists frontends and backends (with nested members), each carrying
//! an `updated_at` timestamp and arbitrary fields. Every field holding a number,
//! or a string that parses as one, becomes a metric key `<prefix>.<field>` with
//! one column per sub-entity.

use super::{coerce_f64, parse_timestamp};
use crate::error::{ReceiverError, Result};
use crate::models::{MetricsColumn, MetricsData, MetricsHints, MetricsItem, MetricsResponse};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Values for one metric key across every series that reported it
struct SeriesBucket {
    timestamp: DateTime<Utc>,
    values: BTreeMap<String, f64>,
}

#[derive(Default)]
struct BucketSet {
    buckets: BTreeMap<String, SeriesBucket>,
}

impl BucketSet {
    fn add(&mut self, metric_key: String, series: &str, value: f64, ts: DateTime<Utc>) {
        let bucket = self.buckets.entry(metric_key).or_insert_with(|| SeriesBucket {
            timestamp: ts,
            values: BTreeMap::new(),
        });
        if ts > bucket.timestamp {
            bucket.timestamp = ts;
        }
        bucket.values.insert(series.to_string(), value);
    }

    /// Fold every numeric field of one sub-entity into its buckets
    fn add_entity(
        &mut self,
        prefix: &str,
        series: &str,
        entity: &Map<String, Value>,
        fetched_at: DateTime<Utc>,
    ) {
        let ts = entity
            .get("updated_at")
            .and_then(parse_timestamp)
            .unwrap_or(fetched_at);

        for (field, raw) in entity {
            let Some(value) = coerce_f64(raw) else {
                continue;
            };
            self.add(format!("{}.{}", prefix, field), series, value, ts);
        }
    }

    fn into_response(self) -> MetricsResponse {
        self.buckets
            .into_iter()
            .map(|(metric_key, bucket)| {
                let mut cols = Vec::with_capacity(bucket.values.len() + 1);
                let mut row = Vec::with_capacity(bucket.values.len() + 1);
                cols.push(MetricsColumn::new("time", "date"));
                row.push(Value::String(
                    bucket.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                ));

                for (series, value) in bucket.values {
                    cols.push(MetricsColumn::new(series, "number"));
                    row.push(Value::from(value));
                }

                let item = MetricsItem {
                    data: MetricsData {
                        cols,
                        rows: vec![row],
                    },
                    hints: MetricsHints {
                        title: metric_key.replace('_', " "),
                    },
                };
                (metric_key, item)
            })
            .collect()
    }
}

/// Sub-entities of a top-level snapshot array, paired with their series name
fn named_entities<'a>(
    items: Option<&'a Value>,
    fallback_prefix: &'a str,
) -> impl Iterator<Item = (String, &'a Map<String, Value>)> + 'a {
    items
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .filter_map(move |(idx, item)| {
            let obj = item.as_object()?;
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}-{}", fallback_prefix, idx));
            Some((name, obj))
        })
}

/// Convert a load balancer snapshot into the tabular shape.
///
/// Fails when the snapshot contains no numeric fields at all.
pub fn convert_snapshot(payload: &Value, fetched_at: DateTime<Utc>) -> Result<MetricsResponse> {
    let root = payload.as_object().ok_or_else(|| {
        ReceiverError::SnapshotConversion("snapshot payload is not an object".to_string())
    })?;

    let mut buckets = BucketSet::default();

    for (name, frontend) in named_entities(root.get("frontends"), "frontend") {
        let series = format!("frontend:{}", name);
        buckets.add_entity("frontend", &series, frontend, fetched_at);
    }

    for (name, backend) in named_entities(root.get("backends"), "backend") {
        let series = format!("backend:{}", name);
        buckets.add_entity("backend", &series, backend, fetched_at);

        for (member_name, member) in named_entities(backend.get("members"), "member") {
            let member_series = format!("{}/member:{}", series, member_name);
            buckets.add_entity("backend.member", &member_series, member, fetched_at);
        }
    }

    if buckets.buckets.is_empty() {
        return Err(ReceiverError::SnapshotConversion(
            "no numeric load balancer metrics discovered".to_string(),
        ));
    }

    Ok(buckets.into_response())
}
