//! Collector units: one per metric family.

use std::collections::HashSet;

use async_trait::async_trait;
use rabbitsight_common::{FieldValue, LiveGauge, MetricDescriptor, MetricSample, MetricSpec};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::source::{DataSource, FetchError};

/// Errors a collector reports for one collection pass.
#[derive(Debug, Clone, Error)]
pub enum CollectorError {
    /// The document could not be fetched. No gauge was touched.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[from] FetchError),

    /// The collection task ended without producing a result.
    #[error("Collection aborted: {0}")]
    Aborted(String),
}

/// A family of metrics read from one document category.
///
/// The metric set returned by [`describe`](Collector::describe) never changes,
/// and every successful [`collect`](Collector::collect) returns exactly one
/// sample per described metric.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Descriptors of every metric this collector exports.
    fn describe(&self) -> Vec<MetricDescriptor>;

    /// Fetch the document, update the gauges and return their samples.
    ///
    /// On a fetch failure nothing is updated and the error is returned.
    async fn collect(&self, source: &dyn DataSource) -> Result<Vec<MetricSample>, CollectorError>;

    /// Current gauge values, without contacting the source.
    fn current(&self) -> Vec<MetricSample>;
}

/// Collector driven by a path-to-metric mapping table.
///
/// The gauge table is built once. Collections only replace values: a path
/// missing from a document leaves its gauge at the last value seen.
#[derive(Debug)]
pub struct TableCollector {
    category: String,
    gauges: Vec<LiveGauge>,
}

impl TableCollector {
    /// Build a collector for a category from its mapping table.
    ///
    /// Only the first mapping of a repeated path is kept.
    pub fn new(category: impl Into<String>, specs: impl IntoIterator<Item = MetricSpec>) -> Self {
        let category = category.into();
        let mut seen = HashSet::new();
        let mut gauges = Vec::new();

        for spec in specs {
            if !seen.insert(spec.path.clone()) {
                warn!(category = %category, path = %spec.path, "Ignoring duplicate path mapping");
                continue;
            }
            gauges.push(LiveGauge::new(spec));
        }

        Self { category, gauges }
    }

    /// The document category this collector reads.
    pub fn category(&self) -> &str {
        &self.category
    }
}

#[async_trait]
impl Collector for TableCollector {
    fn describe(&self) -> Vec<MetricDescriptor> {
        self.gauges.iter().map(|g| g.spec().descriptor()).collect()
    }

    async fn collect(&self, source: &dyn DataSource) -> Result<Vec<MetricSample>, CollectorError> {
        let doc = source.fetch(&self.category).await?;

        let mut updated = 0;
        for gauge in &self.gauges {
            let path = &gauge.spec().path;
            match doc.get(path) {
                Some(FieldValue::Number(value)) => {
                    trace!(path = %path, value, "Set metric for path");
                    gauge.set(*value);
                    updated += 1;
                }
                Some(FieldValue::Malformed(raw)) => {
                    warn!(
                        category = %self.category,
                        path = %path,
                        raw = %raw,
                        "Skipping non-numeric value"
                    );
                }
                None => {}
            }
        }

        debug!(
            category = %self.category,
            updated,
            total = self.gauges.len(),
            "Collected metrics"
        );

        Ok(self.current())
    }

    fn current(&self) -> Vec<MetricSample> {
        self.gauges.iter().map(LiveGauge::sample).collect()
    }
}
