//! Cluster-wide totals and message rates from `/api/overview`.

use std::sync::Arc;

use rabbitsight_common::MetricSpec;

use crate::collector::{Collector, TableCollector};

/// Registry name and document category of the overview family.
pub const OVERVIEW: &str = "overview";

/// Mapping table for the overview document.
pub const OVERVIEW_METRICS: &[MetricSpec] = &[
    MetricSpec::gauge("object_totals.channels", "channelsTotal", "Total number of open channels."),
    MetricSpec::gauge(
        "object_totals.connections",
        "connectionsTotal",
        "Total number of open connections.",
    ),
    MetricSpec::gauge(
        "object_totals.consumers",
        "consumersTotal",
        "Total number of message consumers.",
    ),
    MetricSpec::gauge("object_totals.queues", "queuesTotal", "Total number of queues in use."),
    MetricSpec::gauge(
        "object_totals.exchanges",
        "exchangesTotal",
        "Total number of exchanges in use.",
    ),
    MetricSpec::gauge(
        "queue_totals.messages",
        "queue_messages_total",
        "Total number ready and unacknowledged messages in cluster.",
    ),
    MetricSpec::gauge(
        "queue_totals.messages_ready",
        "queue_messages_ready_total",
        "Total number of messages ready to be delivered to clients.",
    ),
    MetricSpec::gauge(
        "queue_totals.messages_unacknowledged",
        "queue_messages_unacknowledged_total",
        "Total number of messages delivered to clients but not yet acknowledged.",
    ),
    MetricSpec::gauge(
        "message_stats.ack_details.rate",
        "message_stats_ack_details_rate",
        "Total number of messages ack rate per second.",
    ),
    MetricSpec::gauge(
        "message_stats.confirm_details.rate",
        "message_stats_confirm_details_rate",
        "Confirm rate.",
    ),
    MetricSpec::gauge(
        "message_stats.deliver_details.rate",
        "message_stats_deliver_details_rate",
        "Deliver rate.",
    ),
    MetricSpec::gauge(
        "message_stats.deliver_get_details.rate",
        "message_stats_deliver_get_details_rate",
        "Deliver get rate.",
    ),
    MetricSpec::gauge(
        "message_stats.deliver_no_ack_details.rate",
        "message_stats_deliver_no_ack_details_rate",
        "Deliver no ack rate.",
    ),
    MetricSpec::gauge(
        "message_stats.disk_reads_details.rate",
        "message_stats_disk_reads_details_rate",
        "Disk reads rate.",
    ),
    MetricSpec::gauge(
        "message_stats.disk_writes_details.rate",
        "message_stats_disk_writes_details_rate",
        "Disk writes rate.",
    ),
    MetricSpec::gauge(
        "message_stats.get_details.rate",
        "message_stats_get_details_rate",
        "Get rate.",
    ),
    MetricSpec::gauge(
        "message_stats.get_no_ack_details.rate",
        "message_stats_get_no_ack_details_rate",
        "Get no ack rate.",
    ),
    MetricSpec::gauge(
        "message_stats.publish_details.rate",
        "message_stats_publish_details_rate",
        "Publish rate.",
    ),
    MetricSpec::gauge(
        "message_stats.redeliver_details.rate",
        "message_stats_redeliver_details_rate",
        "Redeliver rate.",
    ),
];

/// Factory for the overview collector.
pub fn overview_collector() -> Arc<dyn Collector> {
    Arc::new(TableCollector::new(OVERVIEW, OVERVIEW_METRICS.iter().cloned()))
}
