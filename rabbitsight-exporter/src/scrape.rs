//! Scrape orchestration across all registered collectors.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rabbitsight_common::MetricSample;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::collector::CollectorError;
use crate::registry::CollectorRegistry;
use crate::source::{DataSource, FetchError};

/// A collector that failed during a scrape.
#[derive(Debug, Clone)]
pub struct CollectorFailure {
    pub collector: String,
    pub error: CollectorError,
}

/// Samples contributed by one collector.
#[derive(Debug, Clone)]
pub struct CollectorSamples {
    pub collector: String,
    pub samples: Vec<MetricSample>,
    /// False when the collector failed and these are carried-over values.
    pub fresh: bool,
}

/// Result of one scrape.
#[derive(Debug, Clone, Default)]
pub struct ScrapeReport {
    /// Samples per collector, in registration order.
    pub collectors: Vec<CollectorSamples>,
    pub failures: Vec<CollectorFailure>,
    pub duration: Duration,
}

impl ScrapeReport {
    /// All samples across collectors.
    pub fn samples(&self) -> impl Iterator<Item = &MetricSample> {
        self.collectors.iter().flat_map(|c| c.samples.iter())
    }

    /// Whether at least one collector produced fresh samples.
    pub fn is_up(&self) -> bool {
        self.collectors.iter().any(|c| c.fresh)
    }
}

/// Scrape-level errors.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Every collector failed. The report still holds carried-over samples.
    #[error("All {} collectors failed", .0.failures.len())]
    AllFailed(Box<ScrapeReport>),
}

/// Running scrape statistics.
///
/// A scrape whose future is dropped before it finishes counts in
/// `scrapes_total` only.
#[derive(Debug, Clone, Default)]
pub struct ScrapeStats {
    /// Scrapes started.
    pub scrapes_total: u64,
    /// Scrapes that returned a report.
    pub scrapes_ok: u64,
    /// Scrapes where every collector failed.
    pub scrapes_failed: u64,
    /// Collector failures across all scrapes.
    pub collector_failures_total: u64,
    /// Duration of the most recent scrape.
    pub last_duration: Option<Duration>,
}

impl ScrapeStats {
    /// Scrapes that returned a report.
    pub fn scrapes_succeeded(&self) -> u64 {
        self.scrapes_ok
    }
}

/// Counts a scrape as in flight until dropped, including on cancellation.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let now = counter.fetch_add(1, Ordering::Relaxed) + 1;
        (Self(counter), now)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Runs collection passes over a sealed registry.
///
/// Scrapes may overlap. Gauge updates are atomic and the latest write wins.
pub struct Scraper {
    registry: CollectorRegistry,
    source: Arc<dyn DataSource>,
    collector_timeout: Duration,
    in_flight: AtomicUsize,
    stats: RwLock<ScrapeStats>,
}

/// Create a shareable scraper handle.
pub type SharedScraper = Arc<Scraper>;

impl Scraper {
    /// Create a scraper. Takes ownership of the registry, which ends the
    /// registration phase.
    pub fn new(
        registry: CollectorRegistry,
        source: Arc<dyn DataSource>,
        collector_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            source,
            collector_timeout,
            in_flight: AtomicUsize::new(0),
            stats: RwLock::new(ScrapeStats::default()),
        }
    }

    /// The registry this scraper collects from.
    pub fn registry(&self) -> &CollectorRegistry {
        &self.registry
    }

    /// Number of scrapes currently collecting.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Get scrape statistics.
    pub fn stats(&self) -> ScrapeStats {
        self.stats.read().clone()
    }

    /// Run one collection pass over every collector.
    ///
    /// Collectors run concurrently, each bounded by the collector timeout. A
    /// failed or timed-out collector contributes its carried-over values and
    /// is listed in the report's failures. The scrape only fails when every
    /// collector failed.
    pub async fn scrape(&self) -> Result<ScrapeReport, ScrapeError> {
        let start = Instant::now();
        let (_guard, in_flight) = InFlight::enter(&self.in_flight);
        self.stats.write().scrapes_total += 1;
        debug!(collectors = self.registry.len(), in_flight, "Scrape started");

        let mut tasks = JoinSet::new();
        for (idx, (_, collector)) in self.registry.all().enumerate() {
            let collector = Arc::clone(collector);
            let source = Arc::clone(&self.source);
            let timeout = self.collector_timeout;

            tasks.spawn(async move {
                let result = match tokio::time::timeout(timeout, collector.collect(source.as_ref()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(CollectorError::SourceUnavailable(FetchError::Timeout(
                        timeout,
                    ))),
                };
                (idx, result)
            });
        }

        let mut results: Vec<Option<Result<Vec<MetricSample>, CollectorError>>> =
            (0..self.registry.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => error!(error = %e, "Collector task failed"),
            }
        }

        let mut report = ScrapeReport::default();
        for ((name, collector), result) in self.registry.all().zip(results) {
            let result = result.unwrap_or_else(|| {
                Err(CollectorError::Aborted(
                    "collection task did not complete".to_string(),
                ))
            });

            match result {
                Ok(samples) => report.collectors.push(CollectorSamples {
                    collector: name.to_string(),
                    samples,
                    fresh: true,
                }),
                Err(error) => {
                    warn!(
                        collector = %name,
                        error = %error,
                        "Collector failed, keeping previous values"
                    );
                    report.collectors.push(CollectorSamples {
                        collector: name.to_string(),
                        samples: collector.current(),
                        fresh: false,
                    });
                    report.failures.push(CollectorFailure {
                        collector: name.to_string(),
                        error,
                    });
                }
            }
        }
        report.duration = start.elapsed();

        let all_failed = !report.collectors.is_empty() && !report.is_up();
        {
            let mut stats = self.stats.write();
            stats.collector_failures_total += report.failures.len() as u64;
            stats.last_duration = Some(report.duration);
            if all_failed {
                stats.scrapes_failed += 1;
            } else {
                stats.scrapes_ok += 1;
            }
        }

        debug!(
            collectors = report.collectors.len(),
            failed = report.failures.len(),
            duration_ms = report.duration.as_millis() as u64,
            "Scrape finished"
        );

        if all_failed {
            return Err(ScrapeError::AllFailed(Box::new(report)));
        }
        Ok(report)
    }
}
