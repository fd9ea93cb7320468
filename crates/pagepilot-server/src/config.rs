//! Server configuration: YAML file plus `PP_*` environment overrides.

use pagepilot_adapters::SourceConfig;
use pagepilot_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid override {name}: {value}")]
    Override { name: String, value: String },
}

/// HTTP/server-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_request_mb: u64,
    pub shutdown_grace_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            max_request_mb: 10,
            shutdown_grace_seconds: 10,
        }
    }
}

/// Performance-monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    pub max_samples: usize,
    pub window_seconds: u64,
    /// When set, the realtime loop starts with this interval.
    pub realtime_interval_seconds: Option<u64>,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        PerformanceSettings {
            max_samples: 1000,
            window_seconds: 300,
            realtime_interval_seconds: None,
        }
    }
}

/// Alerting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub enabled: bool,
    pub check_interval_ms: u64,
    pub max_active_alerts: usize,
    pub alert_retention_hours: i64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        MonitoringSettings {
            enabled: true,
            check_interval_ms: 30_000,
            max_active_alerts: 50,
            alert_retention_hours: 24,
        }
    }
}

/// The full application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sources: Vec<SourceConfig>,
    pub cache: CacheConfig,
    pub performance: PerformanceSettings,
    pub monitoring: MonitoringSettings,
}

impl AppConfig {
    /// Loads configuration: the YAML file when given, defaults otherwise,
    /// then `PP_*` environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_yaml::from_str(&raw)?
            }
            None => AppConfig::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies `PP_*` overrides read through `lookup` (injected for tests).
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("PP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PP_PORT") {
            self.server.port = parse_override("PP_PORT", &port)?;
        }
        if let Some(level) = lookup("PP_LOG_LEVEL") {
            self.server.log_level = level;
        }
        if let Some(max_mb) = lookup("PP_MAX_REQUEST_MB") {
            self.server.max_request_mb = parse_override("PP_MAX_REQUEST_MB", &max_mb)?;
        }
        if let Some(enabled) = lookup("PP_CACHE_ENABLED") {
            self.cache.enabled = parse_override("PP_CACHE_ENABLED", &enabled)?;
        }
        if let Some(strategy) = lookup("PP_CACHE_STRATEGY") {
            self.cache.strategy =
                serde_yaml::from_str(&strategy).map_err(|_| ConfigError::Override {
                    name: "PP_CACHE_STRATEGY".to_string(),
                    value: strategy,
                })?;
        }
        if let Some(enabled) = lookup("PP_REDIS_ENABLED") {
            self.cache.remote.enabled = parse_override("PP_REDIS_ENABLED", &enabled)?;
        }
        if let Some(url) = lookup("PP_REDIS_URL") {
            self.cache.remote.url = url;
        }
        if let Some(enabled) = lookup("PP_MONITORING_ENABLED") {
            self.monitoring.enabled = parse_override("PP_MONITORING_ENABLED", &enabled)?;
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Override {
        name: name.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepilot_cache::CacheStrategy;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.max_request_mb, 10);
        assert!(config.cache.enabled);
        assert!(config.monitoring.enabled);
    }

    #[test]
    fn parses_full_yaml() {
        let yaml = r#"
server:
  port: 8080
  log_level: debug
sources:
  - name: local-docs
    adapter_type: filesystem
    path: /var/lib/pagepilot/runbooks
cache:
  strategy: hybrid
  content_types:
    runbooks:
      ttl_seconds: 300
monitoring:
  check_interval_ms: 5000
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].adapter_type, "filesystem");
        assert_eq!(config.cache.strategy, CacheStrategy::Hybrid);
        assert_eq!(config.monitoring.check_interval_ms, 5000);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|name| match name {
                "PP_PORT" => Some("9999".to_string()),
                "PP_CACHE_STRATEGY" => Some("memory_only".to_string()),
                "PP_REDIS_ENABLED" => Some("true".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.cache.strategy, CacheStrategy::MemoryOnly);
        assert!(config.cache.remote.enabled);
    }

    #[test]
    fn bad_override_is_reported() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides(|name| (name == "PP_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Override { .. }));
    }
}
