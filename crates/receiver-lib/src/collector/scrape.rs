//! One scrape cycle
//!
//! Resolves targets for every enabled resource type, then fetches them on a
//! bounded worker pool. Results are reassembled in target order so the batch
//! layout does not depend on which request finished first.

use crate::client::UpCloudApi;
use crate::config::ReceiverConfig;
use crate::emitter::{build_resource_metrics, Allowlist};
use crate::error::{ReceiverError, Result};
use crate::models::{MetricBatch, ResourceMetrics, ResourceType, Target};
use crate::resolver::resolve_targets;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// Everything one cycle produced
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub batch: MetricBatch,
    pub errors: Vec<ReceiverError>,
    /// Successfully scraped targets per enabled resource type
    pub scraped: BTreeMap<ResourceType, usize>,
}

struct ScrapeJob {
    target: Target,
    period: String,
    allowlist: Arc<Allowlist>,
}

/// Runs scrape cycles against the API
#[derive(Clone)]
pub struct Scraper {
    client: Arc<dyn UpCloudApi>,
    config: Arc<ReceiverConfig>,
}

impl Scraper {
    pub fn new(client: Arc<dyn UpCloudApi>, config: Arc<ReceiverConfig>) -> Self {
        Self { client, config }
    }

    /// Run one full cycle. Per-target failures end up in `errors` and never
    /// drop the records of targets that succeeded.
    pub async fn scrape(&self) -> ScrapeOutcome {
        let mut outcome = ScrapeOutcome::default();
        let mut jobs = Vec::new();

        for resource_type in ResourceType::ALL {
            let cfg = self.config.resource(resource_type);
            if !cfg.enabled {
                continue;
            }
            outcome.scraped.insert(resource_type, 0);

            let resolved = resolve_targets(self.client.as_ref(), resource_type, cfg).await;
            if let Some(err) = resolved.discovery_error {
                outcome.errors.push(err);
            }

            debug!(
                resource_type = %resource_type,
                targets = resolved.targets.len(),
                "Resolved scrape targets"
            );

            let allowlist = Arc::new(Allowlist::new(&cfg.metrics));
            jobs.extend(resolved.targets.into_iter().map(|target| ScrapeJob {
                target,
                period: cfg.period.clone(),
                allowlist: Arc::clone(&allowlist),
            }));
        }

        for result in self.run_pool(jobs).await {
            match result {
                Ok((resource_type, resource_metrics)) => {
                    *outcome.scraped.entry(resource_type).or_default() += 1;
                    outcome.batch.resource_metrics.push(resource_metrics);
                }
                Err(e) => outcome.errors.push(e),
            }
        }

        outcome
    }

    /// Fetch every job with at most `max_concurrent_scrapes` in flight.
    /// Dropping the returned future aborts outstanding requests.
    async fn run_pool(&self, jobs: Vec<ScrapeJob>) -> Vec<Result<(ResourceType, ResourceMetrics)>> {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_scrapes.max(1)));
        let mut slots: Vec<Option<Result<(ResourceType, ResourceMetrics)>>> =
            Vec::with_capacity(jobs.len());
        slots.resize_with(jobs.len(), || None);

        let mut tasks = JoinSet::new();
        for (idx, job) in jobs.into_iter().enumerate() {
            let client = Arc::clone(&self.client);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let resource_type = job.target.resource_type;
                let result = scrape_target(client.as_ref(), job).await;
                (idx, result.map(|rm| (resource_type, rm)))
            });
        }

        let mut task_failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => task_failures.push(Err(ReceiverError::Task(e.to_string()))),
            }
        }

        slots.into_iter().flatten().chain(task_failures).collect()
    }
}

async fn scrape_target(client: &dyn UpCloudApi, job: ScrapeJob) -> Result<ResourceMetrics> {
    let ScrapeJob {
        target,
        period,
        allowlist,
    } = job;

    let response = client
        .fetch_metrics(&target, &period)
        .await
        .and_then(|raw| {
            let fetched_at = Utc::now();
            raw.normalize(fetched_at).map(|payload| (payload, fetched_at))
        });

    match response {
        Ok((payload, fetched_at)) => {
            let resource_metrics =
                build_resource_metrics(&target, &payload, &allowlist, fetched_at);
            debug!(
                resource_type = %target.resource_type,
                uuid = %target.uuid,
                metrics = resource_metrics.metrics.len(),
                "Scraped target"
            );
            Ok(resource_metrics)
        }
        Err(e) => Err(ReceiverError::Target {
            resource_type: target.resource_type,
            uuid: target.uuid,
            source: Box::new(e),
        }),
    }
}
