use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use prometheus_client::metrics::gauge::Gauge;
use serde::{Deserialize, Serialize};

/// Kind of an exported metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Value that can go up or down, sampled at scrape time.
    #[default]
    Gauge,
}

impl MetricKind {
    /// Get the TYPE comment string for the exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
        }
    }
}

/// One row of a mapping table: where a value lives in the status document and
/// which metric it is published as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Dotted field path inside the flattened status document.
    pub path: Cow<'static, str>,

    /// Metric name, without the exporter prefix.
    pub name: Cow<'static, str>,

    /// Help text written to the `# HELP` line.
    #[serde(default)]
    pub help: Cow<'static, str>,

    /// Metric kind.
    #[serde(default)]
    pub kind: MetricKind,
}

impl MetricSpec {
    /// Create a gauge mapping from static strings, usable in `const` tables.
    pub const fn gauge(path: &'static str, name: &'static str, help: &'static str) -> Self {
        Self {
            path: Cow::Borrowed(path),
            name: Cow::Borrowed(name),
            help: Cow::Borrowed(help),
            kind: MetricKind::Gauge,
        }
    }

    /// The descriptor advertised for this mapping.
    pub fn descriptor(&self) -> MetricDescriptor {
        MetricDescriptor {
            name: self.name.clone(),
            help: self.help.clone(),
            kind: self.kind,
        }
    }
}

/// Name, help and kind of a metric, independent of any value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricDescriptor {
    pub name: Cow<'static, str>,
    pub help: Cow<'static, str>,
    pub kind: MetricKind,
}

/// A metric value as handed to the exposition sink.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub descriptor: MetricDescriptor,
    /// Current value. `0.0` while the metric has never been observed.
    pub value: f64,
    /// Whether a value has ever been read from the source for this metric.
    pub observed: bool,
}

impl MetricSample {
    /// Metric name, without the exporter prefix.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// A live gauge bound to one [`MetricSpec`].
///
/// Reads and writes are individually atomic, so concurrent collections and
/// exposition reads can interleave without a lock. The latest write wins.
#[derive(Debug)]
pub struct LiveGauge {
    spec: MetricSpec,
    gauge: Gauge<f64, AtomicU64>,
    observed: AtomicBool,
}

impl LiveGauge {
    /// Create an unobserved gauge for a mapping.
    pub fn new(spec: MetricSpec) -> Self {
        Self {
            spec,
            gauge: Gauge::default(),
            observed: AtomicBool::new(false),
        }
    }

    /// The mapping this gauge was built from.
    pub fn spec(&self) -> &MetricSpec {
        &self.spec
    }

    /// Replace the current value.
    pub fn set(&self, value: f64) {
        self.gauge.set(value);
        self.observed.store(true, Ordering::Release);
    }

    /// Current value, `0.0` if never set.
    pub fn get(&self) -> f64 {
        self.gauge.get()
    }

    /// Whether [`set`](Self::set) has ever been called.
    pub fn is_observed(&self) -> bool {
        self.observed.load(Ordering::Acquire)
    }

    /// Snapshot the gauge as a sample.
    pub fn sample(&self) -> MetricSample {
        MetricSample {
            descriptor: self.spec.descriptor(),
            value: self.get(),
            observed: self.is_observed(),
        }
    }
}
