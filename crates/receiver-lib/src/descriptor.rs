//! Metric descriptor registry
//!
//! Maps a (resource type, raw key) pair to the canonical metric name, unit and
//! value normalization. The known-metric table is built once and never
//! mutated; every other key gets a descriptor synthesized from its name.

use crate::models::ResourceType;
use std::collections::HashMap;
use std::sync::OnceLock;

const METRIC_NAMESPACE: &str = "upcloud";
const USAGE_SUFFIX: &str = "_usage";
const EMPTY_NAME_PLACEHOLDER: &str = "unknown";

/// Canonical naming and normalization for a raw metric key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: String,
    pub unit: String,
    /// Raw values are percentages and are emitted as a 0..1 ratio
    pub percent_to_ratio: bool,
}

impl MetricDescriptor {
    fn new(name: impl Into<String>, unit: &str, percent_to_ratio: bool) -> Self {
        Self {
            name: name.into(),
            unit: unit.to_string(),
            percent_to_ratio,
        }
    }

    /// Apply the descriptor's normalization to a raw value
    pub fn normalize_value(&self, value: f64) -> f64 {
        if self.percent_to_ratio {
            value / 100.0
        } else {
            value
        }
    }
}

type DescriptorTable = HashMap<(ResourceType, &'static str), MetricDescriptor>;

static KNOWN_DESCRIPTORS: OnceLock<DescriptorTable> = OnceLock::new();

fn known_descriptors() -> &'static DescriptorTable {
    KNOWN_DESCRIPTORS.get_or_init(|| {
        use ResourceType::{ManagedDatabase as Db, ManagedLoadBalancer as Lb};

        let entries: [(ResourceType, &'static str, &str, &str, bool); 10] = [
            (Db, "cpu_usage", "cpu.utilization", "1", true),
            (Db, "mem_usage", "memory.utilization", "1", true),
            (Db, "disk_usage", "disk.utilization", "1", true),
            (Db, "load_average", "system.load_average", "1", false),
            (Db, "diskio_reads", "disk.io.read_operations", "{operation}/s", false),
            (Db, "diskio_writes", "disk.io.write_operations", "{operation}/s", false),
            (Db, "net_receive", "network.receive", "By/s", false),
            (Db, "net_send", "network.transmit", "By/s", false),
            (Lb, "cpu_usage", "cpu.utilization", "1", true),
            (Lb, "mem_usage", "memory.utilization", "1", true),
        ];

        entries
            .into_iter()
            .map(|(resource_type, key, suffix, unit, percent)| {
                let name = format!("{}.{}.{}", METRIC_NAMESPACE, resource_type.as_str(), suffix);
                ((resource_type, key), MetricDescriptor::new(name, unit, percent))
            })
            .collect()
    })
}

/// Look up or derive the descriptor for a raw metric key. Never fails.
pub fn descriptor_for_metric(resource_type: ResourceType, metric_key: &str) -> MetricDescriptor {
    let metric_key = metric_key.trim();

    if let Some(descriptor) = known_descriptors().get(&(resource_type, metric_key)) {
        return descriptor.clone();
    }

    if let Some(stem) = metric_key.strip_suffix(USAGE_SUFFIX) {
        return MetricDescriptor::new(
            format!(
                "{}.{}.{}.utilization",
                METRIC_NAMESPACE,
                resource_type.as_str(),
                sanitize_metric_path(stem)
            ),
            "1",
            true,
        );
    }

    MetricDescriptor::new(
        format!(
            "{}.{}.{}",
            METRIC_NAMESPACE,
            resource_type.as_str(),
            sanitize_metric_path(metric_key)
        ),
        "1",
        false,
    )
}

/// Lower-case the key and turn every run of characters outside `[a-z0-9]`
/// into a single `.`, without leading or trailing separators.
pub fn sanitize_metric_path(metric_key: &str) -> String {
    let mut out = String::with_capacity(metric_key.len());
    let mut pending_separator = false;

    for c in metric_key.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_separator && !out.is_empty() {
                out.push('.');
            }
            pending_separator = false;
            out.push(c);
        } else {
            pending_separator = true;
        }
    }

    if out.is_empty() {
        EMPTY_NAME_PLACEHOLDER.to_string()
    } else {
        out
    }
}
