//! Target resolution
//!
//! Merges configured identifiers with discovered ones, removes exclusions and
//! returns a sorted, duplicate-free list. A failed discovery never hides the
//! explicitly configured targets.

use crate::client::UpCloudApi;
use crate::config::ResourceConfig;
use crate::error::ReceiverError;
use crate::models::{ResourceType, Target};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Targets for one resource type, plus the discovery failure if any
#[derive(Debug, Default)]
pub struct ResolvedTargets {
    pub targets: Vec<Target>,
    pub discovery_error: Option<ReceiverError>,
}

/// Resolve the targets of one resource type for the current cycle
pub async fn resolve_targets(
    client: &dyn UpCloudApi,
    resource_type: ResourceType,
    cfg: &ResourceConfig,
) -> ResolvedTargets {
    let mut candidates = cfg.uuids.clone();
    let mut discovery_error = None;

    if cfg.auto_discover {
        match client
            .discover(resource_type, &cfg.discovery_path, cfg.discovery_limit)
            .await
        {
            Ok(discovered) => {
                debug!(
                    resource_type = %resource_type,
                    discovered = discovered.len(),
                    "Discovered resources"
                );
                candidates.extend(discovered);
            }
            Err(e) => {
                warn!(
                    resource_type = %resource_type,
                    error = %e,
                    "Discovery failed, using configured identifiers only"
                );
                discovery_error = Some(ReceiverError::Discovery {
                    resource_type,
                    source: Box::new(e),
                });
            }
        }
    }

    let targets = apply_exclusions(candidates, &cfg.exclude_uuids)
        .into_iter()
        .map(|uuid| Target::new(resource_type, uuid))
        .collect();

    ResolvedTargets {
        targets,
        discovery_error,
    }
}

/// Deduplicate, drop excluded and blank identifiers, sort ascending
pub fn apply_exclusions(candidates: Vec<String>, exclude: &[String]) -> Vec<String> {
    let excluded: HashSet<&str> = exclude
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect();

    candidates
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|id| !excluded.contains(id.as_str()))
        .collect()
}
