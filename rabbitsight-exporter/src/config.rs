//! Configuration for the RabbitMQ exporter.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use rabbitsight_common::{LoggingConfig, MetricSpec};

use crate::exposition::{is_reserved_metric_name, is_valid_metric_name};
use crate::registry::is_builtin;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Management API connection settings.
    #[serde(default)]
    pub rabbitmq: RabbitConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Collector selection and scrape settings.
    #[serde(default)]
    pub collectors: CollectorsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// RabbitMQ management API connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RabbitConfig {
    /// Base URL of the management plugin (default: "http://127.0.0.1:15672").
    #[serde(default = "default_url")]
    pub url: String,

    /// Basic auth user (default: "guest").
    #[serde(default = "default_username")]
    pub username: String,

    /// Basic auth password (default: "guest").
    #[serde(default = "default_password")]
    pub password: String,

    /// Per-request timeout in seconds (default: 10).
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_url() -> String {
    "http://127.0.0.1:15672".to_string()
}

fn default_username() -> String {
    "guest".to_string()
}

fn default_password() -> String {
    "guest".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for RabbitConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: default_username(),
            password: default_password(),
            timeout_secs: default_request_timeout(),
        }
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9419").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Metric name prefix (default: "rabbitmq").
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// How metrics that were never read from the source are exposed.
    #[serde(default)]
    pub unobserved: UnobservedPolicy,
}

fn default_listen() -> String {
    "0.0.0.0:9419".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "rabbitmq".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            prefix: default_prefix(),
            unobserved: UnobservedPolicy::default(),
        }
    }
}

/// Exposition of metrics with no observed value yet.
///
/// HELP and TYPE lines are written either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnobservedPolicy {
    /// Write the sample with value 0.
    #[default]
    Zero,
    /// Leave the sample line out.
    Omit,
}

/// Collector selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorsConfig {
    /// Collectors to register, built-in or custom, in order (default: ["overview"]).
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,

    /// Upper bound for one collector during a scrape, in seconds (default: 15).
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_secs: u64,

    /// Table-driven collectors declared in the configuration.
    #[serde(default)]
    pub custom: Vec<CustomCollectorConfig>,
}

fn default_enabled() -> Vec<String> {
    vec!["overview".to_string()]
}

fn default_scrape_timeout() -> u64 {
    15
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            scrape_timeout_secs: default_scrape_timeout(),
            custom: Vec::new(),
        }
    }
}

/// A collector family declared in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCollectorConfig {
    /// Registry name, referenced from `enabled`.
    pub name: String,

    /// Management API document category (`/api/{category}`).
    pub category: String,

    /// Path to metric mappings.
    pub metrics: Vec<MetricSpec>,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a custom collector by name.
    pub fn custom_collector(&self, name: &str) -> Option<&CustomCollectorConfig> {
        self.collectors.custom.iter().find(|c| c.name == name)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rabbitmq.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        if !(self.rabbitmq.url.starts_with("http://") || self.rabbitmq.url.starts_with("https://"))
        {
            return Err(ConfigError::Validation(format!(
                "RabbitMQ url must use http or https: {}",
                self.rabbitmq.url
            )));
        }

        if self.collectors.scrape_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "scrape_timeout_secs must be > 0".to_string(),
            ));
        }

        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if !self.prometheus.prefix.is_empty() && !is_valid_metric_name(&self.prometheus.prefix) {
            return Err(ConfigError::Validation(format!(
                "Invalid metric prefix: {}",
                self.prometheus.prefix
            )));
        }

        let mut custom_names = HashSet::new();
        for custom in &self.collectors.custom {
            if is_builtin(&custom.name) || !custom_names.insert(custom.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate collector name: {}",
                    custom.name
                )));
            }
            validate_custom(custom)?;
        }

        for name in &self.collectors.enabled {
            if !is_builtin(name) && !custom_names.contains(name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Unknown collector: {}",
                    name
                )));
            }
        }

        Ok(())
    }
}

fn validate_custom(custom: &CustomCollectorConfig) -> Result<(), ConfigError> {
    if custom.category.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Collector '{}' has an empty category",
            custom.name
        )));
    }

    if custom.metrics.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Collector '{}' declares no metrics",
            custom.name
        )));
    }

    let mut paths = HashSet::new();
    for spec in &custom.metrics {
        if !is_valid_metric_name(&spec.name) {
            return Err(ConfigError::Validation(format!(
                "Collector '{}': invalid metric name '{}'",
                custom.name, spec.name
            )));
        }
        if is_reserved_metric_name(&spec.name) {
            return Err(ConfigError::Validation(format!(
                "Collector '{}': metric name '{}' is reserved for the exporter",
                custom.name, spec.name
            )));
        }
        if !paths.insert(&*spec.path) {
            return Err(ConfigError::Validation(format!(
                "Collector '{}': duplicate path '{}'",
                custom.name, spec.path
            )));
        }
    }

    Ok(())
}
