//! # Runtime Configuration
//!
//! Everything is read from `NOS_*` environment variables; unset or invalid
//! values fall back to the defaults below.
//!
//! | Variable                  | Default          |
//! |---------------------------|------------------|
//! | `NOS_INFRA_PULL_ADDR`     | `0.0.0.0:5001`   |
//! | `NOS_INFRA_REPLY_ADDR`    | `0.0.0.0:5002`   |
//! | `NOS_APP_PULL_ADDR`       | `0.0.0.0:6001`   |
//! | `NOS_APP_REPLY_ADDR`      | `0.0.0.0:6002`   |
//! | `NOS_RECV_TIMEOUT_MS`     | `1000`           |
//! | `NOS_CONNECT_TIMEOUT_MS`  | `1000`           |
//! | `NOS_MAX_CONNECTIONS`     | `64` per endpoint |
//! | `NOS_SHUTDOWN_GRACE_SECS` | `2`              |
//! | `NOS_META_TICK_MS`        | `1000`           |
//! | `NOS_META_TRIGGERS`       | none (`;`-separated, e.g. `DP_RECEIVE_PACKET>=1000`) |
//! | `NOS_REGISTRY`            | none (built-in subscribers only) |
//! | `NOS_LOG_LEVEL`           | `info` (`RUST_LOG` takes precedence) |
//! | `NOS_JSON_LOGS`           | `false`          |
//!
//! An address set to `off` disables that endpoint.

use nos_bus::{EngineConfig, MetaTrigger};
use nos_types::{EventClass, SubscriberConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Infrastructure bus.
    pub infra: EngineConfig,
    /// Application bus.
    pub app: EngineConfig,
    /// Logging.
    pub logging: LoggingConfig,
    /// Subscriber descriptors file.
    pub registry_file: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            infra: EngineConfig::for_class(EventClass::Infrastructure),
            app: EngineConfig::for_class(EventClass::Application),
            logging: LoggingConfig::default(),
            registry_file: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Errors loading the registry file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid registry file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Subscriber descriptors of both buses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistryFile {
    pub components: Vec<SubscriberConfig>,
    pub applications: Vec<SubscriberConfig>,
}

impl RegistryFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, name: &str, default: T) -> T {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        None => default,
    }
}

fn flag(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::trim),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}

fn address(value: Option<String>, default: Option<String>) -> Option<String> {
    match value.as_deref().map(str::trim) {
        Some("off") | Some("") => None,
        Some(addr) => Some(addr.to_string()),
        None => default,
    }
}

fn apply_engine(
    cfg: &mut EngineConfig,
    prefix: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    shared: &EngineConfig,
) {
    cfg.pull_addr = address(lookup(&format!("NOS_{prefix}_PULL_ADDR")), cfg.pull_addr.take());
    cfg.reply_addr = address(lookup(&format!("NOS_{prefix}_REPLY_ADDR")), cfg.reply_addr.take());
    cfg.recv_timeout = shared.recv_timeout;
    cfg.connect_timeout = shared.connect_timeout;
    cfg.max_connections = shared.max_connections;
    cfg.shutdown_grace = shared.shutdown_grace;
    cfg.meta_tick = shared.meta_tick;
    cfg.triggers = shared.triggers.clone();
}

impl RuntimeConfig {
    /// Load from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key-value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let defaults = EngineConfig::default();

        let triggers = lookup("NOS_META_TRIGGERS")
            .map(|raw| {
                raw.split(';')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .filter_map(|t| match t.parse::<MetaTrigger>() {
                        Ok(trigger) => Some(trigger),
                        Err(e) => {
                            warn!("Ignoring meta trigger: {}", e);
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let shared = EngineConfig {
            recv_timeout: Duration::from_millis(parse_or(
                lookup("NOS_RECV_TIMEOUT_MS"),
                "NOS_RECV_TIMEOUT_MS",
                defaults.recv_timeout.as_millis() as u64,
            )),
            connect_timeout: Duration::from_millis(parse_or(
                lookup("NOS_CONNECT_TIMEOUT_MS"),
                "NOS_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout.as_millis() as u64,
            )),
            max_connections: parse_or(
                lookup("NOS_MAX_CONNECTIONS"),
                "NOS_MAX_CONNECTIONS",
                defaults.max_connections,
            ),
            shutdown_grace: Duration::from_secs(parse_or(
                lookup("NOS_SHUTDOWN_GRACE_SECS"),
                "NOS_SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace.as_secs(),
            )),
            meta_tick: Duration::from_millis(parse_or(
                lookup("NOS_META_TICK_MS"),
                "NOS_META_TICK_MS",
                defaults.meta_tick.as_millis() as u64,
            )),
            triggers,
            ..defaults
        };

        apply_engine(&mut config.infra, "INFRA", &lookup, &shared);
        apply_engine(&mut config.app, "APP", &lookup, &shared);

        config.registry_file = lookup("NOS_REGISTRY")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        config.logging.level = lookup("NOS_LOG_LEVEL").unwrap_or(config.logging.level);
        config.logging.json = flag(lookup("NOS_JSON_LOGS"));

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nos_bus::MetaCondition;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_lookup(|_| None);
        assert_eq!(config.infra.pull_addr.as_deref(), Some("0.0.0.0:5001"));
        assert_eq!(config.app.reply_addr.as_deref(), Some("0.0.0.0:6002"));
        assert_eq!(config.infra.recv_timeout, Duration::from_millis(1000));
        assert_eq!(config.infra.shutdown_grace, Duration::from_secs(2));
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.registry_file.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("NOS_INFRA_PULL_ADDR", "127.0.0.1:7001"),
            ("NOS_APP_REPLY_ADDR", "off"),
            ("NOS_RECV_TIMEOUT_MS", "250"),
            ("NOS_MAX_CONNECTIONS", "8"),
            ("NOS_META_TRIGGERS", "DP_RECEIVE_PACKET>=10; bogus ;SW_CONNECTED==0"),
            ("NOS_REGISTRY", "/etc/nos/registry.json"),
            ("NOS_LOG_LEVEL", "debug"),
            ("NOS_JSON_LOGS", "true"),
        ]));
        assert_eq!(config.infra.pull_addr.as_deref(), Some("127.0.0.1:7001"));
        assert!(config.app.reply_addr.is_none());
        assert_eq!(config.app.recv_timeout, Duration::from_millis(250));
        assert_eq!(config.infra.max_connections, 8);
        assert_eq!(config.infra.triggers.len(), 2);
        assert_eq!(config.infra.triggers[1].condition, MetaCondition::Eq);
        assert_eq!(config.app.triggers.len(), 2);
        assert_eq!(
            config.registry_file.as_deref(),
            Some(Path::new("/etc/nos/registry.json"))
        );
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = RuntimeConfig::from_lookup(lookup(&[("NOS_META_TICK_MS", "soon")]));
        assert_eq!(config.infra.meta_tick, Duration::from_secs(1));
    }

    #[test]
    fn test_registry_file_parsing() {
        let text = r#"{
            "components": [
                {"name": "switch_mgmt", "type": "general", "site": "internal",
                 "role": "base", "perm": "rwx", "status": "enabled", "priority": 50,
                 "inbounds": ["SW_GET_DPID", {"event": "DP_RECEIVE_PACKET", "perm": "r"}],
                 "outbounds": ["SW_CONNECTED"]}
            ],
            "applications": [
                {"name": "l2_learning", "site": "external",
                 "push_addr": "127.0.0.1:6011", "req_addr": "127.0.0.1:6012",
                 "inbounds": ["DP_RECEIVE_PACKET"], "policies": ["dpid:1"]}
            ]
        }"#;
        let file = RegistryFile::parse(text).unwrap();
        assert_eq!(file.components.len(), 1);
        assert_eq!(file.components[0].inbounds.len(), 2);
        assert_eq!(file.applications[0].policies, vec!["dpid:1".to_string()]);

        let missing = RegistryFile::load(Path::new("/nonexistent/nos-registry.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
