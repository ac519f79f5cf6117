//! Producer interface: validated entries in, enqueue receipt or backpressure out.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{LogEntry, ProjectId};
use crate::enrich::Enricher;
use crate::queue::{IngestionQueue, QueueError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueueReceipt {
    pub project_id: ProjectId,
    pub accepted: usize,
    /// Tenant queue depth observed after the append.
    pub depth: u64,
}

#[derive(Error, Debug)]
pub enum IngestError {
    /// The tenant's queue is full; the caller should back off and retry.
    #[error("project {project_id} is over capacity (queue depth {depth})")]
    Backpressure { project_id: ProjectId, depth: u64 },
    #[error(transparent)]
    Queue(QueueError),
}

impl From<QueueError> for IngestError {
    fn from(error: QueueError) -> Self {
        match error {
            QueueError::Full {
                project_id, depth, ..
            } => IngestError::Backpressure { project_id, depth },
            other => IngestError::Queue(other),
        }
    }
}

pub struct IngestService {
    enricher: Arc<Enricher>,
    queue: Arc<IngestionQueue>,
}

impl IngestService {
    #[must_use]
    pub fn new(enricher: Arc<Enricher>, queue: Arc<IngestionQueue>) -> Self {
        Self { enricher, queue }
    }

    pub async fn ingest(
        &self,
        project_id: ProjectId,
        entry: LogEntry,
    ) -> Result<EnqueueReceipt, IngestError> {
        let enriched = self.enricher.enrich(entry, project_id);
        let depth = self
            .queue
            .enqueue(&enriched)
            .await
            .inspect_err(|error| log_rejection(project_id, error))?;

        Ok(EnqueueReceipt {
            project_id,
            accepted: 1,
            depth,
        })
    }

    /// All entries belong to `project_id`, so the batch is admitted or
    /// rejected as a whole.
    pub async fn ingest_batch(
        &self,
        project_id: ProjectId,
        entries: Vec<LogEntry>,
    ) -> Result<EnqueueReceipt, IngestError> {
        if entries.is_empty() {
            let depth = self.queue.depth(project_id).await?;
            return Ok(EnqueueReceipt {
                project_id,
                accepted: 0,
                depth,
            });
        }

        let enriched: Vec<_> = entries
            .into_iter()
            .map(|entry| self.enricher.enrich(entry, project_id))
            .collect();
        let accepted = self
            .queue
            .enqueue_batch(&enriched)
            .await
            .inspect_err(|error| log_rejection(project_id, error))?;
        let depth = self.queue.depth(project_id).await?;
        debug!(project_id, accepted, depth, "batch enqueued");

        Ok(EnqueueReceipt {
            project_id,
            accepted,
            depth,
        })
    }
}

fn log_rejection(project_id: ProjectId, error: &QueueError) {
    if error.is_full() {
        debug!(project_id, %error, "ingest rejected by backpressure");
    } else {
        warn!(project_id, error = %error, "ingest failed");
    }
}
