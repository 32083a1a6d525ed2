//! HTTP implementation of the UpCloud API client

use super::auth::RequestAuth;
use super::discovery::{extract_uuids, paginate_uuids};
use super::UpCloudApi;
use crate::config::{ApiConfig, UUID_PLACEHOLDER};
use crate::error::{ReceiverError, Result};
use crate::models::{ResourceType, Target};
use crate::normalize::RawPayload;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

const DATABASE_METRICS_TEMPLATE: &str = "/1.3/database/{uuid}/metrics";

/// Authenticated client for the UpCloud metrics and listing endpoints
#[derive(Debug, Clone)]
pub struct UpCloudClient {
    client: Client,
    base_url: Url,
    auth: RequestAuth,
    load_balancer_template: String,
}

impl UpCloudClient {
    /// Build a client, resolving credentials (including secret files) once
    pub fn new(api: &ApiConfig, load_balancer_template: impl Into<String>) -> Result<Self> {
        let endpoint = api.endpoint.trim().trim_end_matches('/');
        let base_url = Url::parse(endpoint)
            .map_err(|e| ReceiverError::Config(format!("parse api endpoint: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ReceiverError::Config(
                "api.endpoint must be an absolute URL".to_string(),
            ));
        }

        let auth = RequestAuth::resolve(api)?;

        let client = Client::builder()
            .timeout(api.timeout)
            .build()
            .map_err(|e| ReceiverError::Config(format!("build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            auth,
            load_balancer_template: load_balancer_template.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn metrics_template(&self, resource_type: ResourceType) -> &str {
        match resource_type {
            ResourceType::ManagedDatabase => DATABASE_METRICS_TEMPLATE,
            ResourceType::ManagedLoadBalancer => &self.load_balancer_template,
        }
    }

    /// Append `path` to the endpoint. The identifier replaces the placeholder
    /// as a single encoded segment.
    fn url_for_path(&self, path: &str, uuid: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ReceiverError::Config("api.endpoint cannot carry a path".to_string())
            })?;
            segments.pop_if_empty();
            for segment in path.trim().trim_matches('/').split('/') {
                match uuid {
                    Some(uuid) => segments.push(&segment.replace(UUID_PLACEHOLDER, uuid)),
                    None => segments.push(segment),
                };
            }
        }
        Ok(url)
    }

    fn metrics_url(&self, template: &str, uuid: &str, period: &str) -> Result<Url> {
        let mut url = self.url_for_path(template, Some(uuid))?;
        if !period.trim().is_empty() {
            url.query_pairs_mut().append_pair("period", period);
        }
        Ok(url)
    }

    fn listing_url(&self, discovery_path: &str) -> Result<Url> {
        self.url_for_path(discovery_path, None)
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        let path = url.path().to_string();
        debug!(url = %url, "Requesting UpCloud API");

        let request = self
            .client
            .get(url)
            .header(ACCEPT, "application/json");
        let response = self
            .auth
            .apply(request)
            .send()
            .await
            .map_err(|source| ReceiverError::Request {
                path: path.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReceiverError::Status {
                status: status.as_u16(),
                path,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| ReceiverError::Request {
                path: path.clone(),
                source,
            })?;
        serde_json::from_slice(&body).map_err(|e| ReceiverError::Decode(e.to_string()))
    }

    async fn list_paginated(&self, discovery_path: &str, limit: usize) -> Result<Vec<String>> {
        let base = self.listing_url(discovery_path)?;
        paginate_uuids(limit, |offset| {
            let mut url = base.clone();
            url.query_pairs_mut()
                .clear()
                .append_pair("limit", &limit.to_string())
                .append_pair("offset", &offset.to_string());
            self.get_json(url)
        })
        .await
    }

    async fn list_single_page(&self, discovery_path: &str) -> Result<Vec<String>> {
        let payload = self.get_json(self.listing_url(discovery_path)?).await?;
        let mut ids = extract_uuids(&payload);
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[async_trait]
impl UpCloudApi for UpCloudClient {
    async fn fetch_metrics(&self, target: &Target, period: &str) -> Result<RawPayload> {
        let template = self.metrics_template(target.resource_type);
        let url = self.metrics_url(template, &target.uuid, period)?;
        let payload = self.get_json(url).await?;
        Ok(RawPayload::classify(target.resource_type, payload))
    }

    async fn discover(
        &self,
        resource_type: ResourceType,
        discovery_path: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        match resource_type {
            ResourceType::ManagedDatabase => self.list_paginated(discovery_path, limit).await,
            ResourceType::ManagedLoadBalancer => self.list_single_page(discovery_path).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Secret, DEFAULT_LOAD_BALANCER_METRICS_TEMPLATE};
    use mockito::Matcher;
    use std::time::Duration;

    fn token_api(endpoint: &str) -> ApiConfig {
        ApiConfig {
            endpoint: endpoint.to_string(),
            token: Some(Secret::from("fixture-token")),
            timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    fn client_for(server: &mockito::Server) -> UpCloudClient {
        UpCloudClient::new(&token_api(&server.url()), DEFAULT_LOAD_BALANCER_METRICS_TEMPLATE)
            .unwrap()
    }

    const DB_FIXTURE: &str = r#"{
        "cpu_usage": {
            "hints": {"title": "CPU usage %"},
            "data": {
                "cols": [{"label": "time", "type": "date"}, {"label": "primary", "type": "number"}],
                "rows": [["2026-02-21T08:00:00Z", 2.2]]
            }
        }
    }"#;

    #[test]
    fn test_new_requires_credentials() {
        let api = ApiConfig::default();
        assert!(UpCloudClient::new(&api, DEFAULT_LOAD_BALANCER_METRICS_TEMPLATE).is_err());
    }

    #[test]
    fn test_metrics_url_encodes_uuid() {
        let client = UpCloudClient::new(
            &token_api("https://api.upcloud.com/"),
            DEFAULT_LOAD_BALANCER_METRICS_TEMPLATE,
        )
        .unwrap();

        let url = client
            .metrics_url(DATABASE_METRICS_TEMPLATE, "db uuid/1", "5m")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.upcloud.com/1.3/database/db%20uuid%2F1/metrics?period=5m"
        );

        let url = client
            .metrics_url(DEFAULT_LOAD_BALANCER_METRICS_TEMPLATE, "lb-1", "  ")
            .unwrap();
        assert_eq!(url.as_str(), "https://api.upcloud.com/1.3/load-balancer/lb-1/metrics");
    }

    #[test]
    fn test_metrics_url_keeps_period_verbatim() {
        let client = UpCloudClient::new(
            &token_api("https://api.upcloud.com"),
            DEFAULT_LOAD_BALANCER_METRICS_TEMPLATE,
        )
        .unwrap();

        let url = client
            .metrics_url(DATABASE_METRICS_TEMPLATE, "db-1", " 1h ")
            .unwrap();
        let period: Vec<_> = url
            .query_pairs()
            .filter(|(k, _)| k == "period")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(period, vec![" 1h ".to_string()]);
    }

    #[test]
    fn test_endpoint_path_prefix_is_kept() {
        let client = UpCloudClient::new(
            &token_api("https://proxy.internal/upcloud/"),
            DEFAULT_LOAD_BALANCER_METRICS_TEMPLATE,
        )
        .unwrap();

        let url = client.listing_url("/1.3/database").unwrap();
        assert_eq!(url.as_str(), "https://proxy.internal/upcloud/1.3/database");
    }

    #[tokio::test]
    async fn test_fetch_database_metrics_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/1.3/database/db-uuid/metrics")
            .match_header("authorization", "Bearer fixture-token")
            .match_header("accept", "application/json")
            .match_query(Matcher::UrlEncoded("period".into(), "5m".into()))
            .with_header("content-type", "application/json")
            .with_body(DB_FIXTURE)
            .create_async()
            .await;

        let client = client_for(&server);
        let target = Target::new(ResourceType::ManagedDatabase, "db-uuid");
        let payload = client.fetch_metrics(&target, "5m").await.unwrap();

        mock.assert_async().await;
        assert!(matches!(payload, RawPayload::Tabular(_)));
    }

    #[tokio::test]
    async fn test_fetch_load_balancer_with_basic_auth_file() {
        let dir = tempfile::tempdir().unwrap();
        let password_file = dir.path().join("password");
        std::fs::write(&password_file, "fixture-password\n").unwrap();

        let mut server = mockito::Server::new_async().await;
        // base64("fixture-user:fixture-password")
        let mock = server
            .mock("GET", "/1.3/load-balancer/lb-uuid/metrics")
            .match_header(
                "authorization",
                "Basic Zml4dHVyZS11c2VyOmZpeHR1cmUtcGFzc3dvcmQ=",
            )
            .match_query(Matcher::UrlEncoded("period".into(), "10m".into()))
            .with_body(r#"{"frontends": [{"name": "https-443", "total_http_requests": 12}]}"#)
            .create_async()
            .await;

        let api = ApiConfig {
            endpoint: server.url(),
            username: Some("fixture-user".to_string()),
            password_file: Some(password_file.display().to_string()),
            timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let client = UpCloudClient::new(&api, "/1.3/load-balancer/{uuid}/metrics").unwrap();
        let target = Target::new(ResourceType::ManagedLoadBalancer, "lb-uuid");
        let payload = client.fetch_metrics(&target, "10m").await.unwrap();

        mock.assert_async().await;
        assert!(matches!(payload, RawPayload::Snapshot(_)));
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/1.3/database/db-uuid/metrics")
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server);
        let target = Target::new(ResourceType::ManagedDatabase, "db-uuid");
        let err = client.fetch_metrics(&target, "").await.unwrap_err();

        assert!(matches!(err, ReceiverError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/1.3/database/db-uuid/metrics")
            .match_query(Matcher::Any)
            .with_body("not json")
            .create_async()
            .await;

        let client = client_for(&server);
        let target = Target::new(ResourceType::ManagedDatabase, "db-uuid");
        let err = client.fetch_metrics(&target, "5m").await.unwrap_err();

        assert!(matches!(err, ReceiverError::Decode(_)));
    }

    #[tokio::test]
    async fn test_discover_databases_paginates() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/1.3/database")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "2".into()),
                Matcher::UrlEncoded("offset".into(), "0".into()),
            ]))
            .with_body(r#"[{"uuid": "db-2"}, {"uuid": "db-1"}]"#)
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/1.3/database")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "2".into()),
                Matcher::UrlEncoded("offset".into(), "2".into()),
            ]))
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let ids = client
            .discover(ResourceType::ManagedDatabase, "/1.3/database", 2)
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(ids, vec!["db-1", "db-2"]);
    }

    #[tokio::test]
    async fn test_discover_load_balancers_single_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/1.3/load-balancer")
            .with_body(r#"{"load_balancers": [{"uuid": "lb-2"}, {"uuid": "lb-1"}, {"uuid": "lb-2"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let ids = client
            .discover(ResourceType::ManagedLoadBalancer, "/1.3/load-balancer", 100)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(ids, vec!["lb-1", "lb-2"]);
    }
}
