//! Receiver configuration loading
//!
//! Sources, lowest precedence first: built-in per resource type defaults, an
//! optional file named by `UPCLOUD_RECEIVER_CONFIG`, then `UPCLOUD__*`
//! environment variables (e.g. `UPCLOUD__API__TOKEN`).

use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File};
use receiver_lib::config::{
    DEFAULT_DATABASE_DISCOVERY_PATH, DEFAULT_LOAD_BALANCER_DISCOVERY_PATH,
    DEFAULT_LOAD_BALANCER_METRICS_TEMPLATE,
};
use receiver_lib::ReceiverConfig;

pub const CONFIG_FILE_ENV: &str = "UPCLOUD_RECEIVER_CONFIG";
const ENV_PREFIX: &str = "UPCLOUD";
const ENV_SEPARATOR: &str = "__";
const DEFAULT_OPS_PORT: u16 = 8080;

/// Keys split on commas when given through the environment
const LIST_KEYS: [&str; 6] = [
    "managed_databases.uuids",
    "managed_databases.exclude_uuids",
    "managed_databases.metrics",
    "managed_load_balancers.uuids",
    "managed_load_balancers.exclude_uuids",
    "managed_load_balancers.metrics",
];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub receiver: ReceiverConfig,
    /// Port for /healthz, /readyz and /metrics
    pub ops_port: u16,
}

impl AppConfig {
    /// Load from the file named in the environment (if any) and the process environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV)
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(file.as_deref(), None)
    }

    /// `env_override` replaces the process environment, used by tests
    pub fn load_from(
        file: Option<&str>,
        env_override: Option<std::collections::HashMap<String, String>>,
    ) -> Result<Self> {
        let mut builder = with_defaults(Config::builder())?;

        if let Some(path) = file {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let mut env = Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            env = env.with_list_parse_key(key);
        }
        if let Some(vars) = env_override {
            env = env.source(Some(vars));
        }

        let settings = builder
            .add_source(env)
            .build()
            .context("failed to assemble receiver configuration")?;

        let ops_port = match settings.get::<u16>("ops_port") {
            Ok(port) => port,
            Err(config::ConfigError::NotFound(_)) => DEFAULT_OPS_PORT,
            Err(e) => return Err(e).context("invalid ops_port"),
        };
        let receiver: ReceiverConfig = settings
            .try_deserialize()
            .context("failed to parse receiver configuration")?;

        Ok(Self { receiver, ops_port })
    }
}

fn with_defaults(
    builder: ConfigBuilder<config::builder::DefaultState>,
) -> Result<ConfigBuilder<config::builder::DefaultState>> {
    let builder = builder
        .set_default("managed_databases.enabled", true)?
        .set_default("managed_databases.auto_discover", true)?
        .set_default("managed_databases.discovery_path", DEFAULT_DATABASE_DISCOVERY_PATH)?
        .set_default("managed_load_balancers.enabled", false)?
        .set_default("managed_load_balancers.auto_discover", false)?
        .set_default(
            "managed_load_balancers.discovery_path",
            DEFAULT_LOAD_BALANCER_DISCOVERY_PATH,
        )?
        .set_default(
            "managed_load_balancers.metrics_path_template",
            DEFAULT_LOAD_BALANCER_METRICS_TEMPLATE,
        )?;
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults_without_sources() {
        let cfg = AppConfig::load_from(None, env(&[])).unwrap();

        assert_eq!(cfg.ops_port, 8080);
        assert_eq!(cfg.receiver.collection_interval, Duration::from_secs(60));
        assert!(cfg.receiver.managed_databases.enabled);
        assert!(cfg.receiver.managed_databases.auto_discover);
        assert_eq!(cfg.receiver.managed_databases.discovery_path, "/1.3/database");
        assert!(!cfg.receiver.managed_load_balancers.enabled);
        assert_eq!(
            cfg.receiver.managed_load_balancers.metrics_path_template(),
            "/1.3/load-balancer/{uuid}/metrics"
        );
    }

    #[test]
    fn test_environment_overrides() {
        let cfg = AppConfig::load_from(
            None,
            env(&[
                ("UPCLOUD__API__TOKEN", "env-token"),
                ("UPCLOUD__COLLECTION_INTERVAL", "30s"),
                ("UPCLOUD__OPS_PORT", "9100"),
                ("UPCLOUD__MANAGED_LOAD_BALANCERS__ENABLED", "true"),
                ("UPCLOUD__MANAGED_LOAD_BALANCERS__UUIDS", "lb-1,lb-2"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.ops_port, 9100);
        assert_eq!(cfg.receiver.collection_interval, Duration::from_secs(30));
        assert_eq!(
            cfg.receiver.api.token.as_ref().map(|t| t.expose()),
            Some("env-token")
        );
        assert!(cfg.receiver.managed_load_balancers.enabled);
        assert_eq!(cfg.receiver.managed_load_balancers.uuids, vec!["lb-1", "lb-2"]);
        cfg.receiver.validate().unwrap();
    }

    #[test]
    fn test_file_source() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "initial_delay": "500ms",
                "api": {{"username": "fixture-user", "password": "fixture-password"}},
                "managed_databases": {{"auto_discover": false, "uuids": ["db-1"], "metrics": ["cpu_usage"]}}
            }}"#
        )
        .unwrap();

        let path = file.path().display().to_string();
        let cfg = AppConfig::load_from(Some(&path), env(&[])).unwrap();

        assert_eq!(cfg.receiver.initial_delay, Duration::from_millis(500));
        assert_eq!(cfg.receiver.managed_databases.uuids, vec!["db-1"]);
        assert_eq!(cfg.receiver.managed_databases.metrics, vec!["cpu_usage"]);
        assert!(cfg.receiver.managed_databases.enabled);
        cfg.receiver.validate().unwrap();
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(AppConfig::load_from(Some("/nonexistent/receiver.yaml"), env(&[])).is_err());
    }
}
