use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::LogEntry;

/// Tenant identifier. All queues, partitions scans and rollups are scoped by it.
pub type ProjectId = i64;

/// A [`LogEntry`] after enrichment; the unit the queue carries and storage persists.
///
/// Built once by the enricher and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedLogEntry {
    project_id: ProjectId,
    ingested_at: DateTime<Utc>,
    error_fingerprint: Option<String>,
    entry: LogEntry,
}

impl EnrichedLogEntry {
    pub(crate) fn new(
        project_id: ProjectId,
        entry: LogEntry,
        ingested_at: DateTime<Utc>,
        error_fingerprint: Option<String>,
    ) -> Self {
        Self {
            project_id,
            ingested_at,
            error_fingerprint,
            entry,
        }
    }

    #[must_use]
    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    #[must_use]
    pub fn ingested_at(&self) -> DateTime<Utc> {
        self.ingested_at
    }

    #[must_use]
    pub fn error_fingerprint(&self) -> Option<&str> {
        self.error_fingerprint.as_deref()
    }

    #[must_use]
    pub fn entry(&self) -> &LogEntry {
        &self.entry
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.entry.timestamp
    }
}
