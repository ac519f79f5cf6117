use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{EnrichedLogEntry, ProjectId};
use crate::observability::Metrics;

mod backend;
mod codec;
mod error;

pub use backend::{ListBackend, MemoryListBackend, RedisListBackend};
pub use error::QueueError;

/// Set of tenants that have ever had a queue, used by the drain job.
pub const TENANT_SET_KEY: &str = "queue:logs:tenants";

#[must_use]
pub fn queue_key(project_id: ProjectId) -> String {
    format!("queue:logs:{project_id}")
}

/// Bounded per-tenant FIFO of enriched events with explicit backpressure.
///
/// The admission check reads the depth and then appends in a second round
/// trip, so concurrent producers for one tenant can overshoot `max_depth` by
/// at most their own batch sizes.
pub struct IngestionQueue {
    backend: Arc<dyn ListBackend>,
    max_depth: u64,
    metrics: Arc<Metrics>,
}

impl IngestionQueue {
    #[must_use]
    pub fn new(backend: Arc<dyn ListBackend>, max_depth: u64, metrics: Arc<Metrics>) -> Self {
        Self {
            backend,
            max_depth,
            metrics,
        }
    }

    #[must_use]
    pub fn max_depth(&self) -> u64 {
        self.max_depth
    }

    /// Appends one event, or fails with [`QueueError::Full`] when the tenant's
    /// queue already holds `max_depth` events. Returns the depth afterwards.
    pub async fn enqueue(&self, entry: &EnrichedLogEntry) -> Result<u64, QueueError> {
        let project_id = entry.project_id();
        self.admit(project_id, 1).await?;
        let payload = codec::encode(entry)?;
        self.append(project_id, vec![payload]).await
    }

    /// Enqueues a multi-tenant batch.
    ///
    /// Tenants are processed in order of first appearance. Each tenant's share
    /// is admitted and appended on its own, so when a later tenant is full the
    /// call fails while earlier tenants' shares stay committed. A rejected
    /// tenant never receives a partial share.
    pub async fn enqueue_batch(&self, entries: &[EnrichedLogEntry]) -> Result<usize, QueueError> {
        let mut order = Vec::new();
        let mut groups: HashMap<ProjectId, Vec<&EnrichedLogEntry>> = HashMap::new();
        for entry in entries {
            let share = groups.entry(entry.project_id()).or_insert_with(|| {
                order.push(entry.project_id());
                Vec::new()
            });
            share.push(entry);
        }

        let mut accepted = 0;
        for project_id in order {
            let share = groups.remove(&project_id).unwrap_or_default();
            self.admit(project_id, share.len()).await?;

            let payloads = share
                .iter()
                .map(|entry| codec::encode(entry))
                .collect::<Result<Vec<_>, _>>()?;
            accepted += payloads.len();
            self.append(project_id, payloads).await?;
        }
        Ok(accepted)
    }

    pub async fn depth(&self, project_id: ProjectId) -> Result<u64, QueueError> {
        let depth = self
            .backend
            .len(&queue_key(project_id))
            .await
            .map_err(QueueError::Backend)?;
        self.observe_depth(project_id, depth);
        Ok(depth)
    }

    /// Removes up to `batch_size` events, oldest first.
    ///
    /// Stops early when the queue runs dry. Payloads that fail to decode are
    /// dropped and counted rather than failing the batch.
    pub async fn dequeue_batch(
        &self,
        project_id: ProjectId,
        batch_size: usize,
    ) -> Result<Vec<EnrichedLogEntry>, QueueError> {
        let payloads = self
            .backend
            .pop_back(&queue_key(project_id), batch_size)
            .await
            .map_err(QueueError::Backend)?;

        let mut entries = Vec::with_capacity(payloads.len());
        for payload in payloads {
            match codec::decode(&payload) {
                Ok(entry) => entries.push(entry),
                Err(error) => {
                    self.metrics.decode_failures.inc();
                    warn!(project_id, %error, bytes = payload.len(), "dropping undecodable queued event");
                }
            }
        }
        self.metrics.events_dequeued.inc_by(entries.len() as u64);
        Ok(entries)
    }

    /// Puts undelivered events back so they are the next ones dequeued,
    /// in their original order. Bypasses the admission check.
    pub async fn requeue(
        &self,
        project_id: ProjectId,
        entries: &[EnrichedLogEntry],
    ) -> Result<u64, QueueError> {
        if entries.is_empty() {
            return self.depth(project_id).await;
        }
        let payloads = entries
            .iter()
            .map(codec::encode)
            .collect::<Result<Vec<_>, _>>()?;
        let depth = self
            .backend
            .push_back(&queue_key(project_id), payloads)
            .await
            .map_err(QueueError::Backend)?;
        self.metrics.events_requeued.inc_by(entries.len() as u64);
        self.observe_depth(project_id, depth);
        Ok(depth)
    }

    /// Tenants that have enqueued at least once.
    pub async fn tenants(&self) -> Result<Vec<ProjectId>, QueueError> {
        let members = self
            .backend
            .members(TENANT_SET_KEY)
            .await
            .map_err(QueueError::Backend)?;

        let mut tenants: Vec<ProjectId> = members
            .iter()
            .filter_map(|member| match member.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(member, "ignoring malformed tenant registry member");
                    None
                }
            })
            .collect();
        tenants.sort_unstable();
        Ok(tenants)
    }

    pub async fn ping(&self) -> Result<(), QueueError> {
        self.backend.ping().await.map_err(QueueError::Backend)
    }

    async fn admit(&self, project_id: ProjectId, incoming: usize) -> Result<(), QueueError> {
        let depth = self.depth(project_id).await?;
        if depth >= self.max_depth {
            self.metrics.events_rejected.inc_by(incoming as u64);
            debug!(project_id, depth, max_depth = self.max_depth, "queue full");
            return Err(QueueError::Full {
                project_id,
                depth,
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }

    async fn append(&self, project_id: ProjectId, payloads: Vec<Vec<u8>>) -> Result<u64, QueueError> {
        let count = payloads.len() as u64;
        let key = queue_key(project_id);
        let depth = self
            .backend
            .push_front(&key, payloads)
            .await
            .map_err(QueueError::Backend)?;
        self.backend
            .add_member(TENANT_SET_KEY, &project_id.to_string())
            .await
            .map_err(QueueError::Backend)?;

        self.metrics.events_enqueued.inc_by(count);
        self.observe_depth(project_id, depth);
        Ok(depth)
    }

    fn observe_depth(&self, project_id: ProjectId, depth: u64) {
        self.metrics
            .queue_depth
            .with_label_values(&[&project_id.to_string()])
            .set(i64::try_from(depth).unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{LogEntry, LogLevel, LogType};

    fn event(project_id: ProjectId, message: &str) -> EnrichedLogEntry {
        let entry = LogEntry::new(Utc::now(), LogLevel::Info, LogType::Logger, message);
        EnrichedLogEntry::new(project_id, entry, Utc::now(), None)
    }

    fn queue(max_depth: u64) -> (IngestionQueue, Arc<MemoryListBackend>) {
        let backend = Arc::new(MemoryListBackend::new());
        let metrics = Arc::new(Metrics::detached().expect("metrics"));
        let queue = IngestionQueue::new(backend.clone(), max_depth, metrics);
        (queue, backend)
    }

    fn messages(entries: &[EnrichedLogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.entry().message.as_str()).collect()
    }

    #[test]
    fn keys_are_scoped_by_tenant() {
        assert_eq!(queue_key(42), "queue:logs:42");
        assert_ne!(queue_key(1), queue_key(11));
    }

    #[tokio::test]
    async fn full_queue_rejects_without_growing() {
        let (queue, _) = queue(2);
        queue.enqueue(&event(1, "a")).await.unwrap();
        queue.enqueue(&event(1, "b")).await.unwrap();

        let err = queue.enqueue(&event(1, "c")).await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::Full { project_id: 1, depth: 2, max_depth: 2 }
        ));
        assert_eq!(queue.depth(1).await.unwrap(), 2);
        assert_eq!(queue.enqueue(&event(2, "other")).await.unwrap(), 1);
        assert_eq!(queue.metrics.events_rejected.get(), 1);
    }

    #[tokio::test]
    async fn batch_commits_per_tenant() {
        let (queue, _) = queue(1);
        queue.enqueue(&event(2, "existing")).await.unwrap();

        let batch = vec![event(1, "a1"), event(2, "b1"), event(1, "a2"), event(3, "c1")];
        let err = queue.enqueue_batch(&batch).await.unwrap_err();
        assert!(err.is_full());

        // tenant 1 came first and stays committed; 2 was rejected; 3 was never reached
        assert_eq!(queue.depth(1).await.unwrap(), 2);
        assert_eq!(queue.depth(2).await.unwrap(), 1);
        assert_eq!(queue.depth(3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dequeue_stops_when_queue_runs_dry() {
        let (queue, _) = queue(10);
        queue
            .enqueue_batch(&[event(5, "A"), event(5, "B"), event(5, "C")])
            .await
            .unwrap();

        let drained = queue.dequeue_batch(5, 10).await.unwrap();
        assert_eq!(messages(&drained), vec!["A", "B", "C"]);
        assert!(queue.dequeue_batch(5, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_payloads_are_skipped_and_counted() {
        let (queue, backend) = queue(10);
        queue.enqueue(&event(9, "first")).await.unwrap();
        backend
            .push_front(&queue_key(9), vec![b"not-bincode".to_vec()])
            .await
            .unwrap();
        queue.enqueue(&event(9, "last")).await.unwrap();

        let drained = queue.dequeue_batch(9, 3).await.unwrap();
        assert_eq!(messages(&drained), vec!["first", "last"]);
        assert_eq!(queue.metrics.decode_failures.get(), 1);
    }

    #[tokio::test]
    async fn requeued_events_come_out_first_in_order() {
        let (queue, _) = queue(10);
        queue
            .enqueue_batch(&[event(4, "1"), event(4, "2"), event(4, "3")])
            .await
            .unwrap();

        let taken = queue.dequeue_batch(4, 2).await.unwrap();
        queue.requeue(4, &taken).await.unwrap();

        let drained = queue.dequeue_batch(4, 10).await.unwrap();
        assert_eq!(messages(&drained), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn tenants_are_registered_on_enqueue() {
        let (queue, _) = queue(10);
        queue.enqueue(&event(30, "x")).await.unwrap();
        queue.enqueue(&event(4, "y")).await.unwrap();
        assert_eq!(queue.tenants().await.unwrap(), vec![4, 30]);
    }
}
