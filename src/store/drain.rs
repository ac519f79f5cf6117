use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{debug, error, info, warn};

use super::sink::LogSink;
use crate::domain::ProjectId;
use crate::observability::Metrics;
use crate::partition::{PartitionManager, month_start};
use crate::queue::IngestionQueue;

/// Partitioned table the drained events land in.
pub const LOGS_TABLE: &str = "logs";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub tenants: usize,
    pub persisted: u64,
    pub requeued: usize,
    pub failed_tenants: Vec<ProjectId>,
}

/// Moves queued events into storage, one bounded batch per tenant per pass.
pub struct QueueDrainer {
    queue: Arc<IngestionQueue>,
    partitions: Arc<PartitionManager>,
    sink: Arc<dyn LogSink>,
    batch_size: usize,
    metrics: Arc<Metrics>,
}

impl QueueDrainer {
    #[must_use]
    pub fn new(
        queue: Arc<IngestionQueue>,
        partitions: Arc<PartitionManager>,
        sink: Arc<dyn LogSink>,
        batch_size: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            queue,
            partitions,
            sink,
            batch_size,
            metrics,
        }
    }

    /// Runs one pass over every known tenant.
    ///
    /// A batch whose write fails is requeued at the head of its queue and the
    /// remaining tenants are still drained. The pass then reports failure.
    pub async fn drain_once(&self) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        for project_id in self.queue.tenants().await? {
            let batch = self.queue.dequeue_batch(project_id, self.batch_size).await?;
            if batch.is_empty() {
                continue;
            }
            report.tenants += 1;

            let months: BTreeSet<_> = batch
                .iter()
                .map(|event| month_start(event.timestamp().date_naive()))
                .collect();
            for month in months {
                if !self.partitions.ensure_for_date(LOGS_TABLE, month).await {
                    warn!(project_id, %month, "writing without a confirmed partition");
                }
            }

            match self.sink.write(&batch).await {
                Ok(written) => {
                    self.metrics.rows_persisted.inc_by(written);
                    report.persisted += written;
                    debug!(project_id, written, "drained tenant batch");
                }
                Err(sink_error) => {
                    error!(project_id, error = format!("{sink_error:#}"), events = batch.len(), "log batch write failed; requeueing");
                    self.queue.requeue(project_id, &batch).await?;
                    report.requeued += batch.len();
                    report.failed_tenants.push(project_id);
                }
            }
        }

        if report.tenants > 0 {
            info!(
                tenants = report.tenants,
                persisted = report.persisted,
                requeued = report.requeued,
                "queue drain pass finished"
            );
        }
        if !report.failed_tenants.is_empty() {
            bail!(
                "log writes failed for projects {:?}; {} events requeued",
                report.failed_tenants,
                report.requeued
            );
        }
        Ok(report)
    }
}
