//! Receiver configuration
//!
//! Settings are deserialized once at startup and checked with
//! [`ReceiverConfig::validate`]; nothing downstream re-validates them.

use crate::error::{ReceiverError, Result};
use crate::models::ResourceType;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_ENDPOINT: &str = "https://api.upcloud.com";
pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PERIOD: &str = "5m";
pub const DEFAULT_DISCOVERY_LIMIT: usize = 100;
pub const DEFAULT_MAX_CONCURRENT_SCRAPES: usize = 4;
pub const DEFAULT_DATABASE_DISCOVERY_PATH: &str = "/1.3/database";
pub const DEFAULT_LOAD_BALANCER_DISCOVERY_PATH: &str = "/1.3/load-balancer";
pub const DEFAULT_LOAD_BALANCER_METRICS_TEMPLATE: &str = "/1.3/load-balancer/{uuid}/metrics";

/// Placeholder substituted with the resource identifier in path templates
pub const UUID_PLACEHOLDER: &str = "{uuid}";

/// Top-level receiver settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    #[serde(default = "default_collection_interval", deserialize_with = "deserialize_duration")]
    pub collection_interval: Duration,

    #[serde(default = "default_initial_delay", deserialize_with = "deserialize_duration")]
    pub initial_delay: Duration,

    /// Upper bound on targets fetched in parallel within one cycle
    #[serde(default = "default_max_concurrent_scrapes")]
    pub max_concurrent_scrapes: usize,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default = "ResourceConfig::managed_database_defaults")]
    pub managed_databases: ResourceConfig,

    #[serde(default = "ResourceConfig::managed_load_balancer_defaults")]
    pub managed_load_balancers: ResourceConfig,
}

/// Endpoint and authentication settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub token: Option<Secret>,
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<Secret>,
    #[serde(default)]
    pub password_file: Option<String>,
    #[serde(default = "default_api_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

/// Per resource type scrape settings
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub uuids: Vec<String>,
    #[serde(default)]
    pub exclude_uuids: Vec<String>,
    /// Passed verbatim to the API as the `period` query parameter
    #[serde(default = "default_period")]
    pub period: String,
    /// Raw metric keys to keep; empty keeps everything
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub auto_discover: bool,
    #[serde(default)]
    pub discovery_path: String,
    #[serde(default = "default_discovery_limit")]
    pub discovery_limit: usize,
    /// Load balancers only
    #[serde(default)]
    pub metrics_path_template: Option<String>,
}

/// A credential that never shows up in `Debug` output
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

fn default_collection_interval() -> Duration {
    DEFAULT_COLLECTION_INTERVAL
}

fn default_initial_delay() -> Duration {
    DEFAULT_INITIAL_DELAY
}

fn default_api_timeout() -> Duration {
    DEFAULT_API_TIMEOUT
}

fn default_api_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_string()
}

fn default_period() -> String {
    DEFAULT_PERIOD.to_string()
}

fn default_discovery_limit() -> usize {
    DEFAULT_DISCOVERY_LIMIT
}

fn default_max_concurrent_scrapes() -> usize {
    DEFAULT_MAX_CONCURRENT_SCRAPES
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            collection_interval: DEFAULT_COLLECTION_INTERVAL,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_concurrent_scrapes: DEFAULT_MAX_CONCURRENT_SCRAPES,
            api: ApiConfig::default(),
            managed_databases: ResourceConfig::managed_database_defaults(),
            managed_load_balancers: ResourceConfig::managed_load_balancer_defaults(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_api_endpoint(),
            token: None,
            token_file: None,
            username: None,
            password: None,
            password_file: None,
            timeout: DEFAULT_API_TIMEOUT,
        }
    }
}

impl ResourceConfig {
    /// Databases are scraped by default and discovered automatically
    pub fn managed_database_defaults() -> Self {
        Self {
            enabled: true,
            uuids: Vec::new(),
            exclude_uuids: Vec::new(),
            period: default_period(),
            metrics: Vec::new(),
            auto_discover: true,
            discovery_path: DEFAULT_DATABASE_DISCOVERY_PATH.to_string(),
            discovery_limit: DEFAULT_DISCOVERY_LIMIT,
            metrics_path_template: None,
        }
    }

    /// Load balancers are opt-in
    pub fn managed_load_balancer_defaults() -> Self {
        Self {
            enabled: false,
            uuids: Vec::new(),
            exclude_uuids: Vec::new(),
            period: default_period(),
            metrics: Vec::new(),
            auto_discover: false,
            discovery_path: DEFAULT_LOAD_BALANCER_DISCOVERY_PATH.to_string(),
            discovery_limit: DEFAULT_DISCOVERY_LIMIT,
            metrics_path_template: Some(DEFAULT_LOAD_BALANCER_METRICS_TEMPLATE.to_string()),
        }
    }

    /// The load balancer metrics path template, falling back to the default
    pub fn metrics_path_template(&self) -> &str {
        non_blank(self.metrics_path_template.as_deref())
            .unwrap_or(DEFAULT_LOAD_BALANCER_METRICS_TEMPLATE)
    }

    fn validate(&self, resource_type: ResourceType) -> Result<()> {
        let block = block_name(resource_type);

        if resource_type == ResourceType::ManagedDatabase
            && non_blank(self.metrics_path_template.as_deref()).is_some()
        {
            return Err(config_error(format!(
                "{}.metrics_path_template is only supported for managed_load_balancers",
                block
            )));
        }
        if !self.enabled {
            return Ok(());
        }
        if !self.auto_discover && self.uuids.iter().all(|id| id.trim().is_empty()) {
            return Err(config_error(format!(
                "{block}.uuids must be set when {block}.enabled=true and {block}.auto_discover=false"
            )));
        }
        if self.auto_discover {
            if self.discovery_path.trim().is_empty() {
                return Err(config_error(format!(
                    "{}.discovery_path is required when auto_discover=true",
                    block
                )));
            }
            if self.discovery_limit == 0 {
                return Err(config_error(format!(
                    "{}.discovery_limit must be > 0 when auto_discover=true",
                    block
                )));
            }
        }
        if resource_type == ResourceType::ManagedLoadBalancer
            && !self.metrics_path_template().contains(UUID_PLACEHOLDER)
        {
            return Err(config_error(format!(
                "{}.metrics_path_template must contain {}",
                block, UUID_PLACEHOLDER
            )));
        }
        Ok(())
    }
}

impl ReceiverConfig {
    /// Settings block for a resource type
    pub fn resource(&self, resource_type: ResourceType) -> &ResourceConfig {
        match resource_type {
            ResourceType::ManagedDatabase => &self.managed_databases,
            ResourceType::ManagedLoadBalancer => &self.managed_load_balancers,
        }
    }

    /// Check every setting; the receiver never starts on error
    pub fn validate(&self) -> Result<()> {
        if self.collection_interval.is_zero() {
            return Err(config_error("collection_interval must be > 0"));
        }
        if self.max_concurrent_scrapes == 0 {
            return Err(config_error("max_concurrent_scrapes must be > 0"));
        }
        self.api.validate()?;
        if !self.managed_databases.enabled && !self.managed_load_balancers.enabled {
            return Err(config_error(
                "at least one managed service block must be enabled",
            ));
        }
        for resource_type in ResourceType::ALL {
            self.resource(resource_type).validate(resource_type)?;
        }
        Ok(())
    }
}

impl ApiConfig {
    /// Bearer token or basic credentials, never both
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(config_error("api.endpoint is required"));
        }
        let parsed = url::Url::parse(endpoint)
            .map_err(|e| config_error(format!("api.endpoint is invalid: {}", e)))?;
        if parsed.cannot_be_a_base() {
            return Err(config_error("api.endpoint must be an absolute URL"));
        }
        if self.timeout.is_zero() {
            return Err(config_error("api.timeout must be > 0"));
        }

        let has_token = non_blank(self.token.as_ref().map(Secret::expose)).is_some();
        let has_token_file = non_blank(self.token_file.as_deref()).is_some();
        let has_bearer = has_token || has_token_file;

        let has_username = non_blank(self.username.as_deref()).is_some();
        let has_password = non_blank(self.password.as_ref().map(Secret::expose)).is_some();
        let has_password_file = non_blank(self.password_file.as_deref()).is_some();
        let has_basic = has_username || has_password || has_password_file;

        if has_token && has_token_file {
            return Err(config_error("api.token and api.token_file are mutually exclusive"));
        }
        if has_password && has_password_file {
            return Err(config_error(
                "api.password and api.password_file are mutually exclusive",
            ));
        }
        if has_bearer && has_basic {
            return Err(config_error(
                "bearer auth (token/token_file) and basic auth (username/password) are mutually exclusive",
            ));
        }
        if !has_bearer && !has_basic {
            return Err(config_error(
                "api authentication is required: set token/token_file or username+password",
            ));
        }
        if has_basic {
            if !has_username {
                return Err(config_error("api.username is required when using basic auth"));
            }
            if !has_password && !has_password_file {
                return Err(config_error(
                    "api.password or api.password_file is required when using basic auth",
                ));
            }
        }
        Ok(())
    }
}

fn block_name(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::ManagedDatabase => "managed_databases",
        ResourceType::ManagedLoadBalancer => "managed_load_balancers",
    }
}

fn config_error(msg: impl Into<String>) -> ReceiverError {
    ReceiverError::Config(msg.into())
}

/// Trimmed value, or `None` when absent or blank
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse `"500ms"`, `"30s"`, `"5m"`, `"1h"` or a bare number of seconds
pub fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration {:?}", raw))?;
    let seconds = match unit.trim() {
        "" | "s" => value,
        "ms" => value / 1000.0,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("unknown duration unit {:?} in {:?}", other, raw)),
    };

    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration {:?}: {}", raw, e))
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(u64),
        Text(String),
    }

    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_database_config() -> ReceiverConfig {
        let mut cfg = ReceiverConfig::default();
        cfg.api.token = Some(Secret::from("token"));
        cfg.managed_databases.auto_discover = false;
        cfg.managed_databases.uuids = vec!["db-uuid".to_string()];
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = ReceiverConfig::default();
        assert_eq!(cfg.collection_interval, Duration::from_secs(60));
        assert_eq!(cfg.initial_delay, Duration::from_secs(1));
        assert_eq!(cfg.api.endpoint, "https://api.upcloud.com");
        assert_eq!(cfg.api.timeout, Duration::from_secs(10));
        assert!(cfg.managed_databases.enabled);
        assert!(cfg.managed_databases.auto_discover);
        assert!(!cfg.managed_load_balancers.enabled);
        assert_eq!(
            cfg.managed_load_balancers.metrics_path_template(),
            "/1.3/load-balancer/{uuid}/metrics"
        );
    }

    #[test]
    fn test_valid_configs() {
        assert!(valid_database_config().validate().is_ok());

        let mut discover = valid_database_config();
        discover.managed_databases.uuids.clear();
        discover.managed_databases.auto_discover = true;
        assert!(discover.validate().is_ok());

        let mut token_file = valid_database_config();
        token_file.api.token = None;
        token_file.api.token_file = Some("/tmp/upcloud-token".to_string());
        assert!(token_file.validate().is_ok());

        let mut basic = valid_database_config();
        basic.api.token = None;
        basic.api.username = Some("user".to_string());
        basic.api.password = Some(Secret::from("pass"));
        assert!(basic.validate().is_ok());

        let mut lb = valid_database_config();
        lb.managed_databases.enabled = false;
        lb.managed_load_balancers.enabled = true;
        lb.managed_load_balancers.auto_discover = true;
        assert!(lb.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let cases: Vec<(&str, Box<dyn Fn(&mut ReceiverConfig)>)> = vec![
            ("missing auth", Box::new(|c| c.api.token = None)),
            (
                "token and token file",
                Box::new(|c| c.api.token_file = Some("/tmp/t".to_string())),
            ),
            (
                "bearer and basic mixed",
                Box::new(|c| c.api.username = Some("user".to_string())),
            ),
            (
                "basic missing username",
                Box::new(|c| {
                    c.api.token = None;
                    c.api.password = Some(Secret::from("pass"));
                }),
            ),
            (
                "basic missing password",
                Box::new(|c| {
                    c.api.token = None;
                    c.api.username = Some("user".to_string());
                }),
            ),
            (
                "password and password file",
                Box::new(|c| {
                    c.api.token = None;
                    c.api.username = Some("user".to_string());
                    c.api.password = Some(Secret::from("pass"));
                    c.api.password_file = Some("/tmp/p".to_string());
                }),
            ),
            ("zero interval", Box::new(|c| c.collection_interval = Duration::ZERO)),
            ("zero timeout", Box::new(|c| c.api.timeout = Duration::ZERO)),
            ("relative endpoint", Box::new(|c| c.api.endpoint = "/1.3".to_string())),
            ("blank endpoint", Box::new(|c| c.api.endpoint = "  ".to_string())),
            ("zero concurrency", Box::new(|c| c.max_concurrent_scrapes = 0)),
            ("enabled without uuids", Box::new(|c| c.managed_databases.uuids.clear())),
            (
                "discovery without path",
                Box::new(|c| {
                    c.managed_databases.auto_discover = true;
                    c.managed_databases.discovery_path = String::new();
                }),
            ),
            (
                "discovery with zero limit",
                Box::new(|c| {
                    c.managed_databases.auto_discover = true;
                    c.managed_databases.discovery_limit = 0;
                }),
            ),
            (
                "load balancer template without placeholder",
                Box::new(|c| {
                    c.managed_load_balancers.enabled = true;
                    c.managed_load_balancers.uuids = vec!["lb".to_string()];
                    c.managed_load_balancers.metrics_path_template =
                        Some("/1.3/load-balancer/metrics".to_string());
                }),
            ),
            (
                "template on databases",
                Box::new(|c| {
                    c.managed_databases.metrics_path_template = Some("/x/{uuid}".to_string())
                }),
            ),
            (
                "nothing enabled",
                Box::new(|c| c.managed_databases.enabled = false),
            ),
        ];

        for (name, mutate) in cases {
            let mut cfg = valid_database_config();
            mutate(&mut cfg);
            let err = cfg.validate();
            assert!(
                matches!(err, Err(ReceiverError::Config(_))),
                "expected config error for {name}"
            );
        }
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("15").unwrap(), Duration::from_secs(15));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("3d").is_err());
    }

    #[test]
    fn test_deserialize_from_json() {
        let cfg: ReceiverConfig = serde_json::from_value(serde_json::json!({
            "collection_interval": "30s",
            "initial_delay": 0,
            "api": {"token": "abc", "timeout": "2s"},
            "managed_databases": {"enabled": true, "uuids": ["db-1"]}
        }))
        .unwrap();

        assert_eq!(cfg.collection_interval, Duration::from_secs(30));
        assert_eq!(cfg.initial_delay, Duration::ZERO);
        assert_eq!(cfg.api.timeout, Duration::from_secs(2));
        assert_eq!(cfg.api.token.as_ref().map(Secret::expose), Some("abc"));
        // a partially specified block falls back to field defaults
        assert!(!cfg.managed_databases.auto_discover);
        assert_eq!(cfg.managed_databases.period, "5m");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::from("hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }
}
