//! Prometheus text exposition of scrape reports.

use std::collections::HashSet;
use std::fmt::Write;

use rabbitsight_common::MetricKind;
use tracing::warn;

use crate::config::{PrometheusConfig, UnobservedPolicy};
use crate::scrape::{ScrapeReport, ScrapeStats};

const UP: &str = "up";
const COLLECTOR_FAILURES: &str = "exporter_collector_failures";
const SCRAPE_DURATION: &str = "exporter_scrape_duration_seconds";
const SCRAPES_TOTAL: &str = "exporter_scrapes_total";
const SCRAPES_FAILED_TOTAL: &str = "exporter_scrapes_failed_total";

/// Unprefixed names of the metrics the exporter reports about itself.
/// Collectors may not export these.
pub const SELF_METRICS: &[&str] = &[
    UP,
    COLLECTOR_FAILURES,
    SCRAPE_DURATION,
    SCRAPES_TOTAL,
    SCRAPES_FAILED_TOTAL,
];

/// Whether a metric name is taken by the exporter's own metrics.
pub fn is_reserved_metric_name(name: &str) -> bool {
    SELF_METRICS.contains(&name)
}

/// Check a metric name against `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Build a full metric name: `{prefix}_{name}`, or `name` without a prefix.
pub fn build_metric_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", prefix, name)
    }
}

/// Render a scrape report, followed by the exporter's own metrics.
pub fn render(report: &ScrapeReport, stats: &ScrapeStats, config: &PrometheusConfig) -> String {
    let mut output = String::with_capacity(report.samples().count() * 120 + 1024);
    let mut written = HashSet::new();

    for sample in report.samples() {
        if !written.insert(sample.name()) {
            warn!(metric = %sample.name(), "Dropping repeated metric family");
            continue;
        }

        let name = build_metric_name(&config.prefix, sample.name());
        write_header(
            &mut output,
            &name,
            &sample.descriptor.help,
            sample.descriptor.kind,
        );

        if sample.observed || config.unobserved == UnobservedPolicy::Zero {
            writeln!(output, "{} {}", name, format_value(sample.value)).ok();
        }
    }

    render_self_metrics(&mut output, report, stats, &config.prefix);
    output
}

/// Render a failed scrape: the carried-over values plus one comment per
/// failed collector.
pub fn render_failure(
    report: &ScrapeReport,
    stats: &ScrapeStats,
    config: &PrometheusConfig,
) -> String {
    let mut output = String::new();
    for failure in &report.failures {
        writeln!(
            output,
            "# collector {} failed: {}",
            failure.collector,
            single_line(&failure.error.to_string())
        )
        .ok();
    }
    output.push_str(&render(report, stats, config));
    output
}

fn render_self_metrics(
    output: &mut String,
    report: &ScrapeReport,
    stats: &ScrapeStats,
    prefix: &str,
) {
    let gauges = [
        (
            UP,
            "Whether the last scrape reached the management API.",
            if report.is_up() { 1.0 } else { 0.0 },
        ),
        (
            COLLECTOR_FAILURES,
            "Collectors that failed during this scrape.",
            report.failures.len() as f64,
        ),
        (
            SCRAPE_DURATION,
            "Duration of this scrape.",
            report.duration.as_secs_f64(),
        ),
    ];

    for (suffix, help, value) in gauges {
        let name = build_metric_name(prefix, suffix);
        write_header(output, &name, help, MetricKind::Gauge);
        writeln!(output, "{} {}", name, format_value(value)).ok();
    }

    let counters = [
        (
            SCRAPES_TOTAL,
            "Scrapes started since the exporter started.",
            stats.scrapes_total,
        ),
        (
            SCRAPES_FAILED_TOTAL,
            "Scrapes where every collector failed.",
            stats.scrapes_failed,
        ),
    ];

    for (suffix, help, value) in counters {
        let name = build_metric_name(prefix, suffix);
        writeln!(output, "# HELP {} {}", name, escape_help(help)).ok();
        writeln!(output, "# TYPE {} counter", name).ok();
        writeln!(output, "{} {}", name, value).ok();
    }
}

fn write_header(output: &mut String, name: &str, help: &str, kind: MetricKind) {
    if !help.is_empty() {
        writeln!(output, "# HELP {} {}", name, escape_help(help)).ok();
    }
    writeln!(output, "# TYPE {} {}", name, kind.as_str()).ok();
}

/// Escape special characters in HELP text.
fn escape_help(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

fn single_line(value: &str) -> String {
    value.replace(['\n', '\r'], " ")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorError;
    use crate::scrape::{CollectorFailure, CollectorSamples};
    use crate::source::FetchError;
    use rabbitsight_common::{LiveGauge, MetricSpec};
    use std::time::Duration;

    fn sample(
        name: &'static str,
        help: &'static str,
        value: Option<f64>,
    ) -> rabbitsight_common::MetricSample {
        let gauge = LiveGauge::new(MetricSpec::gauge("p", name, help));
        if let Some(v) = value {
            gauge.set(v);
        }
        gauge.sample()
    }

    fn report(samples: Vec<rabbitsight_common::MetricSample>, fresh: bool) -> ScrapeReport {
        ScrapeReport {
            collectors: vec![CollectorSamples {
                collector: "overview".to_string(),
                samples,
                fresh,
            }],
            failures: Vec::new(),
            duration: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_metric_name_validation() {
        assert!(is_valid_metric_name("queuesTotal"));
        assert!(is_valid_metric_name("message_stats_ack_details_rate"));
        assert!(is_valid_metric_name("_private:sub"));
        assert!(!is_valid_metric_name(""));
        assert!(!is_valid_metric_name("1queues"));
        assert!(!is_valid_metric_name("queues.total"));
        assert!(!is_valid_metric_name("queues-total"));
    }

    #[test]
    fn test_reserved_metric_names() {
        assert!(is_reserved_metric_name("up"));
        assert!(is_reserved_metric_name("exporter_scrapes_total"));
        assert!(!is_reserved_metric_name("queuesTotal"));

        let output = render(
            &ScrapeReport::default(),
            &ScrapeStats::default(),
            &PrometheusConfig::default(),
        );
        for name in SELF_METRICS {
            let family = format!("# TYPE rabbitmq_{} ", name);
            assert_eq!(output.matches(&family).count(), 1, "{name}");
        }
    }

    #[test]
    fn test_repeated_family_written_once() {
        let report = ScrapeReport {
            collectors: vec![
                CollectorSamples {
                    collector: "a".to_string(),
                    samples: vec![sample("shared", "", Some(1.0))],
                    fresh: true,
                },
                CollectorSamples {
                    collector: "b".to_string(),
                    samples: vec![sample("shared", "", Some(2.0))],
                    fresh: true,
                },
            ],
            ..Default::default()
        };
        let output = render(&report, &ScrapeStats::default(), &PrometheusConfig::default());

        assert_eq!(output.matches("# TYPE rabbitmq_shared gauge").count(), 1);
        assert!(output.contains("rabbitmq_shared 1\n"));
    }

    #[test]
    fn test_build_metric_name() {
        assert_eq!(
            build_metric_name("rabbitmq", "queuesTotal"),
            "rabbitmq_queuesTotal"
        );
        assert_eq!(build_metric_name("", "queuesTotal"), "queuesTotal");
    }

    #[test]
    fn test_render_help_type_and_value() {
        let report = report(
            vec![sample("queuesTotal", "Total number of queues in use.", Some(5.0))],
            true,
        );
        let output = render(&report, &ScrapeStats::default(), &PrometheusConfig::default());

        assert!(output.contains("# HELP rabbitmq_queuesTotal Total number of queues in use.\n"));
        assert!(output.contains("# TYPE rabbitmq_queuesTotal gauge\n"));
        assert!(output.contains("\nrabbitmq_queuesTotal 5\n"));
        assert!(output.contains("rabbitmq_up 1\n"));
        assert!(output.contains("rabbitmq_exporter_collector_failures 0\n"));
        assert!(output.contains("rabbitmq_exporter_scrape_duration_seconds 0.25\n"));
        assert!(output.contains("# TYPE rabbitmq_exporter_scrapes_total counter\n"));
    }

    #[test]
    fn test_render_unobserved_zero() {
        let report = report(vec![sample("connectionsTotal", "", None)], true);
        let output = render(&report, &ScrapeStats::default(), &PrometheusConfig::default());

        assert!(output.contains("# TYPE rabbitmq_connectionsTotal gauge\n"));
        assert!(output.contains("rabbitmq_connectionsTotal 0\n"));
    }

    #[test]
    fn test_render_unobserved_omit() {
        let config = PrometheusConfig {
            unobserved: UnobservedPolicy::Omit,
            ..Default::default()
        };
        let report = report(
            vec![
                sample("connectionsTotal", "Connections.", None),
                sample("queuesTotal", "Queues.", Some(0.0)),
            ],
            true,
        );
        let output = render(&report, &ScrapeStats::default(), &config);

        assert!(output.contains("# TYPE rabbitmq_connectionsTotal gauge\n"));
        assert!(!output.contains("rabbitmq_connectionsTotal 0"));
        assert!(output.contains("rabbitmq_queuesTotal 0\n"), "observed zero is kept");
    }

    #[test]
    fn test_render_without_prefix() {
        let config = PrometheusConfig {
            prefix: String::new(),
            ..Default::default()
        };
        let report = report(vec![sample("queuesTotal", "", Some(5.0))], true);
        let output = render(&report, &ScrapeStats::default(), &config);

        assert!(output.contains("\nqueuesTotal 5\n") || output.starts_with("# TYPE queuesTotal"));
        assert!(output.contains("\nup 1\n"));
    }

    #[test]
    fn test_render_failure_comments() {
        let mut report = report(vec![sample("queuesTotal", "", Some(7.0))], false);
        report.failures.push(CollectorFailure {
            collector: "overview".to_string(),
            error: CollectorError::SourceUnavailable(FetchError::AuthFailed(401)),
        });
        let stats = ScrapeStats {
            scrapes_total: 3,
            scrapes_failed: 1,
            ..Default::default()
        };

        let output = render_failure(&report, &stats, &PrometheusConfig::default());

        assert!(output.starts_with("# collector overview failed: Source unavailable"));
        assert!(output.contains("rabbitmq_queuesTotal 7\n"));
        assert!(output.contains("rabbitmq_up 0\n"));
        assert!(output.contains("rabbitmq_exporter_collector_failures 1\n"));
        assert!(output.contains("rabbitmq_exporter_scrapes_total 3\n"));
        assert!(output.contains("rabbitmq_exporter_scrapes_failed_total 1\n"));
    }

    #[test]
    fn test_escape_help() {
        assert_eq!(escape_help("simple"), "simple");
        assert_eq!(escape_help("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_help("with\nnewline"), "with\\nnewline");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(3.14), "3.14");
        assert_eq!(format_value(-2.0), "-2");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }
}
