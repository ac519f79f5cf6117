/// Prometheus metric definitions.
use std::sync::Arc;

use prometheus::{
    HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Registry,
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_vec_with_registry,
};

#[derive(Debug, Clone)]
pub struct Metrics {
    // ingestion queue
    pub events_enqueued: IntCounter,
    pub events_rejected: IntCounter,
    pub events_dequeued: IntCounter,
    pub events_requeued: IntCounter,
    pub decode_failures: IntCounter,
    pub queue_depth: IntGaugeVec,

    // partitions
    pub partitions_created: IntCounter,
    pub partition_failures: IntCounter,

    // scheduler
    pub job_runs: IntCounterVec,
    pub job_skipped: IntCounterVec,
    pub job_duration: HistogramVec,

    // rollups and storage
    pub rollup_cache_writes: IntCounterVec,
    pub rows_persisted: IntCounter,
    pub routes_updated: IntCounter,
}

impl Metrics {
    /// Registers every collector against `registry`.
    ///
    /// # Errors
    /// Fails when a collector with the same name is already registered.
    #[allow(clippy::too_many_lines)]
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            events_enqueued: register_int_counter_with_registry!(
                "rollup_queue_events_enqueued_total",
                "Events accepted into tenant queues",
                registry
            )?,
            events_rejected: register_int_counter_with_registry!(
                "rollup_queue_events_rejected_total",
                "Events rejected because a tenant queue was full",
                registry
            )?,
            events_dequeued: register_int_counter_with_registry!(
                "rollup_queue_events_dequeued_total",
                "Events removed from tenant queues and decoded",
                registry
            )?,
            events_requeued: register_int_counter_with_registry!(
                "rollup_queue_events_requeued_total",
                "Events pushed back after a failed storage write",
                registry
            )?,
            decode_failures: register_int_counter_with_registry!(
                "rollup_queue_decode_failures_total",
                "Dequeued payloads skipped because they could not be decoded",
                registry
            )?,
            queue_depth: register_int_gauge_vec_with_registry!(
                "rollup_queue_depth",
                "Last observed depth per tenant queue",
                &["project_id"],
                registry
            )?,
            partitions_created: register_int_counter_with_registry!(
                "rollup_partitions_created_total",
                "Monthly partitions created",
                registry
            )?,
            partition_failures: register_int_counter_with_registry!(
                "rollup_partition_create_failures_total",
                "Monthly partition creations that failed",
                registry
            )?,
            job_runs: register_int_counter_vec_with_registry!(
                "rollup_job_runs_total",
                "Scheduled job runs by outcome",
                &["job", "outcome"],
                registry
            )?,
            job_skipped: register_int_counter_vec_with_registry!(
                "rollup_job_skipped_total",
                "Scheduled ticks that did not start a run",
                &["job", "reason"],
                registry
            )?,
            job_duration: register_histogram_vec_with_registry!(
                "rollup_job_duration_seconds",
                "Wall time of scheduled job runs",
                &["job"],
                registry
            )?,
            rollup_cache_writes: register_int_counter_vec_with_registry!(
                "rollup_cache_writes_total",
                "Per-tenant snapshots written to the cache",
                &["kind"],
                registry
            )?,
            rows_persisted: register_int_counter_with_registry!(
                "rollup_rows_persisted_total",
                "Log rows written to storage by the drain job",
                registry
            )?,
            routes_updated: register_int_counter_with_registry!(
                "rollup_routes_updated_total",
                "Projects whose available routes changed",
                registry
            )?,
        })
    }

    /// Metrics backed by a private registry that nothing exports.
    ///
    /// # Errors
    /// Propagates registration failures.
    pub fn detached() -> Result<Self, prometheus::Error> {
        Self::new(Arc::new(Registry::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_twice_on_one_registry_fails() {
        let registry = Arc::new(Registry::new());
        Metrics::new(Arc::clone(&registry)).expect("first registration");
        assert!(Metrics::new(registry).is_err());
    }

    #[test]
    fn detached_instances_are_independent() {
        let first = Metrics::detached().expect("metrics");
        let second = Metrics::detached().expect("metrics");
        first.events_enqueued.inc();
        assert_eq!(first.events_enqueued.get(), 1);
        assert_eq!(second.events_enqueued.get(), 0);
    }
}
