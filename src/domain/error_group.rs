use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProjectId;

/// Triage state of an error group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorGroupStatus {
    Unresolved,
    Resolved,
    Ignored,
}

impl ErrorGroupStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorGroupStatus::Unresolved => "unresolved",
            ErrorGroupStatus::Resolved => "resolved",
            ErrorGroupStatus::Ignored => "ignored",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "unresolved" => Some(ErrorGroupStatus::Unresolved),
            "resolved" => Some(ErrorGroupStatus::Resolved),
            "ignored" => Some(ErrorGroupStatus::Ignored),
            _ => None,
        }
    }
}

/// Persisted aggregate of every occurrence sharing one fingerprint within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorGroup {
    pub id: i64,
    pub project_id: ProjectId,
    pub fingerprint: String,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub occurrence_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: ErrorGroupStatus,
}
