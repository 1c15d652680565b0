//! Collector registry.
//!
//! Registration happens during startup through `&mut self`. Once the registry
//! is handed to a [`Scraper`](crate::scrape::Scraper) it is only shared
//! immutably, so the set of collectors is fixed for the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::collector::{Collector, TableCollector};
use crate::config::ExporterConfig;
use crate::exposition::is_reserved_metric_name;
use crate::overview::{OVERVIEW, overview_collector};

/// Errors raised while registering collectors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Collector '{0}' is already registered")]
    DuplicateName(String),

    #[error("Metric '{metric}' of collector '{second}' is already exported by '{first}'")]
    DuplicateMetric {
        metric: String,
        first: String,
        second: String,
    },

    #[error("Metric '{metric}' of collector '{collector}' is reserved for the exporter")]
    ReservedMetric { metric: String, collector: String },

    #[error("Unknown collector: {0}")]
    Unknown(String),
}

/// Built-in collector families and their factories.
const BUILTIN: &[(&str, fn() -> Arc<dyn Collector>)] = &[(OVERVIEW, overview_collector)];

/// Whether a collector name refers to a built-in family.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN.iter().any(|(n, _)| *n == name)
}

struct Entry {
    name: String,
    collector: Arc<dyn Collector>,
}

/// Named collectors, in registration order.
#[derive(Default)]
pub struct CollectorRegistry {
    entries: Vec<Entry>,
    /// Metric name to the collector that exports it.
    owners: HashMap<String, String>,
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("collectors", &self.names().collect::<Vec<_>>())
            .field("metrics", &self.owners.len())
            .finish()
    }
}

impl CollectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for the collectors enabled in the configuration.
    pub fn from_config(config: &ExporterConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        for name in &config.collectors.enabled {
            if let Some((_, factory)) = BUILTIN.iter().find(|(n, _)| *n == name.as_str()) {
                registry.register(name.clone(), *factory)?;
            } else if let Some(custom) = config.custom_collector(name) {
                let custom = custom.clone();
                registry.register(name.clone(), move || {
                    Arc::new(TableCollector::new(custom.category, custom.metrics))
                })?;
            } else {
                return Err(RegistryError::Unknown(name.clone()));
            }
        }

        Ok(registry)
    }

    /// Register a collector under a unique name.
    ///
    /// The factory is called once, only if the name is free. The collector's
    /// metric names must not clash with any already registered metric or with
    /// the exporter's own metrics. On error the registry is left unchanged.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: FnOnce() -> Arc<dyn Collector>,
    {
        let name = name.into();
        if self.entries.iter().any(|e| e.name == name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let collector = factory();
        let descriptors = collector.describe();

        let mut claimed: HashMap<String, String> = HashMap::with_capacity(descriptors.len());
        for desc in &descriptors {
            let metric = desc.name.to_string();
            if is_reserved_metric_name(&metric) {
                return Err(RegistryError::ReservedMetric {
                    metric,
                    collector: name,
                });
            }
            if let Some(first) = self.owners.get(&metric).or_else(|| claimed.get(&metric)) {
                return Err(RegistryError::DuplicateMetric {
                    metric,
                    first: first.clone(),
                    second: name,
                });
            }
            claimed.insert(metric, name.clone());
        }

        info!(collector = %name, metrics = descriptors.len(), "Collector registered");

        self.owners.extend(claimed);
        self.entries.push(Entry { name, collector });
        Ok(())
    }

    /// The collector registered under `name`.
    ///
    /// Always the same instance: collectors keep their gauge values between
    /// scrapes.
    pub fn instantiate(&self, name: &str) -> Option<Arc<dyn Collector>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| Arc::clone(&e.collector))
    }

    /// All collectors, in registration order.
    pub fn all(&self) -> impl Iterator<Item = (&str, &Arc<dyn Collector>)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), &e.collector))
    }

    /// Registered collector names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Number of registered collectors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no collector is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomCollectorConfig;
    use rabbitsight_common::MetricSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn table(category: &str, metrics: &[(&'static str, &'static str)]) -> Arc<dyn Collector> {
        Arc::new(TableCollector::new(
            category,
            metrics
                .iter()
                .map(|(path, name)| MetricSpec::gauge(*path, *name, "")),
        ))
    }

    #[test]
    fn test_register_and_instantiate() {
        let mut registry = CollectorRegistry::new();
        registry.register("overview", overview_collector).unwrap();

        let first = registry.instantiate("overview").unwrap();
        let second = registry.instantiate("overview").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.instantiate("nodes").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_name_never_calls_factory() {
        let mut registry = CollectorRegistry::new();
        registry
            .register("a", || table("a", &[("x", "x_total")]))
            .unwrap();

        let calls = AtomicUsize::new(0);
        let result = registry.register("a", || {
            calls.fetch_add(1, Ordering::SeqCst);
            table("a", &[("y", "y_total")])
        });

        assert!(matches!(result, Err(RegistryError::DuplicateName(ref n)) if n == "a"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_factory_called_once() {
        let calls = AtomicUsize::new(0);
        let mut registry = CollectorRegistry::new();
        registry
            .register("a", || {
                calls.fetch_add(1, Ordering::SeqCst);
                table("a", &[("x", "x_total")])
            })
            .unwrap();

        for _ in 0..3 {
            registry.instantiate("a").unwrap();
            let _ = registry.all().count();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_metric_collision_across_collectors() {
        let mut registry = CollectorRegistry::new();
        registry
            .register("a", || table("a", &[("x", "shared")]))
            .unwrap();

        let err = registry
            .register("b", || table("b", &[("y", "unique"), ("z", "shared")]))
            .unwrap_err();

        match err {
            RegistryError::DuplicateMetric {
                metric,
                first,
                second,
            } => {
                assert_eq!(metric, "shared");
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("unexpected error: {other}"),
        }

        // Nothing from the rejected collector leaked in.
        assert_eq!(registry.len(), 1);
        registry
            .register("c", || table("c", &[("y", "unique")]))
            .unwrap();
    }

    #[test]
    fn test_metric_collision_within_collector() {
        let mut registry = CollectorRegistry::new();
        let err = registry
            .register("a", || table("a", &[("x", "same"), ("y", "same")]))
            .unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateMetric { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_self_metric_names_are_reserved() {
        let mut registry = CollectorRegistry::new();
        let err = registry
            .register("c", || table("c", &[("v", "value"), ("u", "up")]))
            .unwrap_err();

        assert!(matches!(
            err,
            RegistryError::ReservedMetric { ref metric, ref collector }
                if metric == "up" && collector == "c"
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_all_preserves_registration_order() {
        let mut registry = CollectorRegistry::new();
        registry.register("b", || table("b", &[("x", "b_x")])).unwrap();
        registry.register("a", || table("a", &[("x", "a_x")])).unwrap();

        let names: Vec<_> = registry.all().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(registry.names().collect::<Vec<_>>(), names);
    }

    #[test]
    fn test_from_config_builtin_and_custom() {
        let mut config = ExporterConfig::default();
        config.collectors.custom.push(CustomCollectorConfig {
            name: "vhost".to_string(),
            category: "vhosts/%2F".to_string(),
            metrics: vec![MetricSpec::gauge("messages", "vhost_messages", "")],
        });
        config.collectors.enabled = vec!["vhost".to_string(), "overview".to_string()];

        let registry = CollectorRegistry::from_config(&config).unwrap();

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["vhost", "overview"]);
        let vhost = registry.instantiate("vhost").unwrap();
        assert_eq!(vhost.describe()[0].name, "vhost_messages");
    }

    #[test]
    fn test_from_config_unknown() {
        let mut config = ExporterConfig::default();
        config.collectors.enabled = vec!["queues".to_string()];

        let err = CollectorRegistry::from_config(&config).unwrap_err();
        assert!(matches!(err, RegistryError::Unknown(ref n) if n == "queues"));
    }

    #[test]
    fn test_is_builtin() {
        assert!(is_builtin("overview"));
        assert!(!is_builtin("queues"));
    }
}
