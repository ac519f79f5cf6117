//! Shapes stored in the rollup cache and the grouped rows they are folded from.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{LogLevel, ProjectId};

/// One `(tenant, bucket, level)` count from a grouped scan of `logs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelCountRow {
    pub project_id: ProjectId,
    pub bucket: DateTime<Utc>,
    pub level: LogLevel,
    pub count: i64,
}

/// Daily event count joined with the tenant's quota (absent when the tenant
/// has no quota configured).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRow {
    pub project_id: ProjectId,
    pub day: NaiveDate,
    pub log_count: i64,
    pub daily_quota: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRow {
    pub project_id: ProjectId,
    pub route: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRateRecord {
    pub bucket: DateTime<Utc>,
    pub error_count: i64,
    pub critical_count: i64,
}

/// Counts per level for one bucket; absent levels are zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogVolumeRecord {
    pub bucket: DateTime<Utc>,
    pub debug: i64,
    pub info: i64,
    pub warning: i64,
    pub error: i64,
    pub critical: i64,
}

impl LogVolumeRecord {
    #[must_use]
    pub fn empty(bucket: DateTime<Utc>) -> Self {
        Self {
            bucket,
            debug: 0,
            info: 0,
            warning: 0,
            error: 0,
            critical: 0,
        }
    }

    pub fn add(&mut self, level: LogLevel, count: i64) {
        let slot = match level {
            LogLevel::Debug => &mut self.debug,
            LogLevel::Info => &mut self.info,
            LogLevel::Warning => &mut self.warning,
            LogLevel::Error => &mut self.error,
            LogLevel::Critical => &mut self.critical,
        };
        *slot += count;
    }

    #[must_use]
    pub fn total(&self) -> i64 {
        self.debug + self.info + self.warning + self.error + self.critical
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopErrorRecord {
    pub group_id: i64,
    pub fingerprint: String,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub occurrence_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub date: NaiveDate,
    pub log_count: i64,
    pub daily_quota: i64,
    pub quota_used_percent: f64,
}

/// Cached document: always a complete replacement of the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupSnapshot<T> {
    pub project_id: ProjectId,
    pub kind: String,
    pub window: String,
    pub generated_at: DateTime<Utc>,
    pub records: Vec<T>,
}
