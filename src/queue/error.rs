use thiserror::Error;

use crate::domain::ProjectId;

#[derive(Error, Debug)]
pub enum QueueError {
    /// Backpressure: the tenant's queue is at its configured maximum.
    #[error("queue for project {project_id} is full ({depth}/{max_depth})")]
    Full {
        project_id: ProjectId,
        depth: u64,
        max_depth: u64,
    },
    #[error("failed to encode queued event: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("queue backend failure")]
    Backend(#[source] anyhow::Error),
}

impl QueueError {
    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full { .. })
    }
}
