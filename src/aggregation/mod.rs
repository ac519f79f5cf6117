//! Scheduled rollups of raw events into cached per-tenant snapshots.
//!
//! Each refresh runs one grouped query across all tenants, folds the rows in
//! memory and writes one complete snapshot per tenant. Tenants without rows
//! get no write; their previous snapshot is left to expire.

mod cache;
pub mod fold;
pub mod records;
mod routes;
mod source;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::domain::ProjectId;
use crate::observability::Metrics;

pub use cache::{RedisSnapshotCache, SnapshotCache};
pub use records::RollupSnapshot;
pub use routes::{PgProjectRoutesStore, ProjectRoutesStore, RouteSync};
pub use source::{PgRollupSource, RollupSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollupKind {
    ErrorRate,
    LogVolume,
    TopErrors,
    Usage,
}

impl RollupKind {
    pub const ALL: [RollupKind; 4] = [
        RollupKind::ErrorRate,
        RollupKind::LogVolume,
        RollupKind::TopErrors,
        RollupKind::Usage,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RollupKind::ErrorRate => "error_rate",
            RollupKind::LogVolume => "log_volume",
            RollupKind::TopErrors => "top_errors",
            RollupKind::Usage => "usage",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }

    /// Label of the source window, also the last cache key segment.
    #[must_use]
    pub fn window_label(self) -> &'static str {
        match self {
            RollupKind::ErrorRate | RollupKind::TopErrors => "24h",
            RollupKind::LogVolume => "7d",
            RollupKind::Usage => "30d",
        }
    }

    #[must_use]
    pub fn window(self) -> TimeDelta {
        match self {
            RollupKind::ErrorRate | RollupKind::TopErrors => TimeDelta::hours(24),
            RollupKind::LogVolume => TimeDelta::days(7),
            RollupKind::Usage => TimeDelta::days(30),
        }
    }

    /// `metrics:<kind>:<project_id>:<window>`
    #[must_use]
    pub fn cache_key(self, project_id: ProjectId) -> String {
        format!(
            "metrics:{}:{project_id}:{}",
            self.as_str(),
            self.window_label()
        )
    }
}

impl fmt::Display for RollupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RollupSettings {
    pub error_rate_ttl: Duration,
    pub log_volume_ttl: Duration,
    pub top_errors_ttl: Duration,
    pub usage_ttl: Duration,
    pub top_errors_limit: usize,
    pub default_daily_quota: i64,
}

impl RollupSettings {
    #[must_use]
    pub fn ttl(&self, kind: RollupKind) -> Duration {
        match kind {
            RollupKind::ErrorRate => self.error_rate_ttl,
            RollupKind::LogVolume => self.log_volume_ttl,
            RollupKind::TopErrors => self.top_errors_ttl,
            RollupKind::Usage => self.usage_ttl,
        }
    }
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self {
            error_rate_ttl: Duration::from_secs(600),
            log_volume_ttl: Duration::from_secs(7200),
            top_errors_ttl: Duration::from_secs(1200),
            usage_ttl: Duration::from_secs(7200),
            top_errors_limit: 50,
            default_daily_quota: 1_000_000,
        }
    }
}

pub struct AggregationEngine {
    source: Arc<dyn RollupSource>,
    cache: Arc<dyn SnapshotCache>,
    settings: RollupSettings,
    metrics: Arc<Metrics>,
}

impl AggregationEngine {
    #[must_use]
    pub fn new(
        source: Arc<dyn RollupSource>,
        cache: Arc<dyn SnapshotCache>,
        settings: RollupSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            source,
            cache,
            settings,
            metrics,
        }
    }

    /// Recomputes one rollup as of `now`. Returns the number of tenants written.
    ///
    /// Any query or cache failure aborts the run; snapshots already written
    /// for other tenants stay in place.
    pub async fn refresh(&self, kind: RollupKind, now: DateTime<Utc>) -> Result<usize> {
        match kind {
            RollupKind::ErrorRate => self.refresh_error_rate(now).await,
            RollupKind::LogVolume => self.refresh_log_volume(now).await,
            RollupKind::TopErrors => self.refresh_top_errors(now).await,
            RollupKind::Usage => self.refresh_usage(now).await,
        }
    }

    pub async fn refresh_error_rate(&self, now: DateTime<Utc>) -> Result<usize> {
        let kind = RollupKind::ErrorRate;
        let rows = self.source.error_rate_rows(now - kind.window()).await?;
        self.publish(kind, fold::error_rate(&rows), now).await
    }

    pub async fn refresh_log_volume(&self, now: DateTime<Utc>) -> Result<usize> {
        let kind = RollupKind::LogVolume;
        let rows = self.source.log_volume_rows(now - kind.window()).await?;
        self.publish(kind, fold::log_volume(&rows), now).await
    }

    pub async fn refresh_top_errors(&self, now: DateTime<Utc>) -> Result<usize> {
        let kind = RollupKind::TopErrors;
        let limit = self.settings.top_errors_limit;
        let groups = self
            .source
            .top_error_groups(now - kind.window(), limit)
            .await?;
        self.publish(kind, fold::top_errors(groups, limit), now).await
    }

    pub async fn refresh_usage(&self, now: DateTime<Utc>) -> Result<usize> {
        let kind = RollupKind::Usage;
        let rows = self.source.usage_rows(now - kind.window()).await?;
        let folded = fold::usage(&rows, self.settings.default_daily_quota);
        self.publish(kind, folded, now).await
    }

    /// The cached snapshot for one tenant, or `None` if not yet computed or expired.
    pub async fn read_snapshot<T: DeserializeOwned>(
        &self,
        kind: RollupKind,
        project_id: ProjectId,
    ) -> Result<Option<RollupSnapshot<T>>> {
        let key = kind.cache_key(project_id);
        let Some(bytes) = self.cache.get(&key).await? else {
            return Ok(None);
        };
        let snapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to decode snapshot {key}"))?;
        Ok(Some(snapshot))
    }

    async fn publish<T: Serialize>(
        &self,
        kind: RollupKind,
        per_tenant: fold::PerTenant<T>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let ttl = self.settings.ttl(kind);
        let mut written = 0;

        for (project_id, records) in per_tenant {
            if records.is_empty() {
                continue;
            }
            let key = kind.cache_key(project_id);
            let snapshot = RollupSnapshot {
                project_id,
                kind: kind.as_str().to_string(),
                window: kind.window_label().to_string(),
                generated_at: now,
                records,
            };
            let payload = serde_json::to_vec(&snapshot)
                .with_context(|| format!("failed to encode snapshot {key}"))?;
            self.cache.set(&key, payload, ttl).await?;
            self.metrics
                .rollup_cache_writes
                .with_label_values(&[kind.as_str()])
                .inc();
            written += 1;
            debug!(%kind, project_id, "snapshot written");
        }

        info!(%kind, tenants = written, "rollup refreshed");
        Ok(written)
    }
}
