//! UpCloud API access
//!
//! This module provides:
//! - Credential resolution (bearer token or basic auth, inline or from file)
//! - Metric fetches per resource, returned as a classified [`RawPayload`]
//! - Identifier discovery (paginated for databases, single page for load balancers)

mod auth;
mod discovery;
mod http;

pub use auth::{resolve_secret, RequestAuth};
pub use discovery::{extract_uuids, paginate_uuids};
pub use http::UpCloudClient;

use crate::error::Result;
use crate::models::{ResourceType, Target};
use crate::normalize::RawPayload;
use async_trait::async_trait;

/// Remote API used by the scrape cycle
#[async_trait]
pub trait UpCloudApi: Send + Sync {
    /// Fetch the metrics payload for one target. A blank period is not sent.
    async fn fetch_metrics(&self, target: &Target, period: &str) -> Result<RawPayload>;

    /// List resource identifiers of one type.
    ///
    /// `limit` is the page size for paginated listings and is ignored by
    /// single-page ones.
    async fn discover(
        &self,
        resource_type: ResourceType,
        discovery_path: &str,
        limit: usize,
    ) -> Result<Vec<String>>;
}
