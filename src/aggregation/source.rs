use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::records::{LevelCountRow, RouteRow, UsageRow};
use crate::domain::{ErrorGroup, ErrorGroupStatus, LogLevel};

/// Grouped reads over raw event storage. Every method is a single pass over
/// all tenants.
#[async_trait]
pub trait RollupSource: Send + Sync {
    /// `error` and `critical` counts in 5-minute buckets.
    async fn error_rate_rows(&self, since: DateTime<Utc>) -> Result<Vec<LevelCountRow>>;

    /// Counts for every level in 1-hour buckets.
    async fn log_volume_rows(&self, since: DateTime<Utc>) -> Result<Vec<LevelCountRow>>;

    /// Unresolved groups seen since `since`, at most `limit` per tenant.
    async fn top_error_groups(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<ErrorGroup>>;

    /// Per-day counts joined with each tenant's quota.
    async fn usage_rows(&self, since: DateTime<Utc>) -> Result<Vec<UsageRow>>;

    /// Distinct `"METHOD path"` signatures from endpoint events.
    async fn route_rows(&self, since: DateTime<Utc>) -> Result<Vec<RouteRow>>;
}

#[derive(Debug, Clone)]
pub struct PgRollupSource {
    pool: PgPool,
}

impl PgRollupSource {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn level_rows(rows: Vec<PgRow>) -> Result<Vec<LevelCountRow>> {
        rows.into_iter()
            .map(|row| -> Result<LevelCountRow> {
                let level: String = row.try_get("level")?;
                Ok(LevelCountRow {
                    project_id: row.try_get("project_id")?,
                    bucket: row.try_get("bucket")?,
                    level: LogLevel::parse(&level)
                        .ok_or_else(|| anyhow!("unknown log level in storage: {level}"))?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RollupSource for PgRollupSource {
    async fn error_rate_rows(&self, since: DateTime<Utc>) -> Result<Vec<LevelCountRow>> {
        let rows = sqlx::query(
            r"
            SELECT project_id,
                   to_timestamp(floor(extract(epoch FROM timestamp) / 300) * 300) AS bucket,
                   level,
                   count(*) AS count
            FROM logs
            WHERE timestamp >= $1
              AND level IN ('error', 'critical')
            GROUP BY project_id, bucket, level
            ",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("failed to query error rate buckets")?;

        Self::level_rows(rows)
    }

    async fn log_volume_rows(&self, since: DateTime<Utc>) -> Result<Vec<LevelCountRow>> {
        let rows = sqlx::query(
            r"
            SELECT project_id,
                   date_trunc('hour', timestamp AT TIME ZONE 'UTC') AT TIME ZONE 'UTC' AS bucket,
                   level,
                   count(*) AS count
            FROM logs
            WHERE timestamp >= $1
            GROUP BY project_id, bucket, level
            ",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("failed to query log volume buckets")?;

        Self::level_rows(rows)
    }

    async fn top_error_groups(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<ErrorGroup>> {
        let limit = i64::try_from(limit).context("top errors limit out of range")?;
        let rows = sqlx::query(
            r"
            SELECT id, project_id, fingerprint, error_type, error_message,
                   occurrence_count, first_seen, last_seen, status
            FROM (
                SELECT eg.*,
                       row_number() OVER (
                           PARTITION BY project_id
                           ORDER BY occurrence_count DESC, last_seen DESC
                       ) AS rn
                FROM error_groups eg
                WHERE status = 'unresolved'
                  AND last_seen >= $1
            ) ranked
            WHERE rn <= $2
            ",
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to query top error groups")?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.try_get("status")?;
            groups.push(ErrorGroup {
                id: row.try_get("id")?,
                project_id: row.try_get("project_id")?,
                fingerprint: row.try_get("fingerprint")?,
                error_type: row.try_get("error_type")?,
                error_message: row.try_get("error_message")?,
                occurrence_count: row.try_get("occurrence_count")?,
                first_seen: row.try_get("first_seen")?,
                last_seen: row.try_get("last_seen")?,
                status: ErrorGroupStatus::parse(&status)
                    .ok_or_else(|| anyhow!("unknown error group status: {status}"))?,
            });
        }
        Ok(groups)
    }

    async fn usage_rows(&self, since: DateTime<Utc>) -> Result<Vec<UsageRow>> {
        let rows = sqlx::query(
            r"
            SELECT l.project_id,
                   (l.timestamp AT TIME ZONE 'UTC')::date AS day,
                   count(*) AS log_count,
                   p.daily_quota
            FROM logs l
            LEFT JOIN projects p ON p.id = l.project_id
            WHERE l.timestamp >= $1
            GROUP BY l.project_id, day, p.daily_quota
            ",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("failed to query daily usage")?;

        let mut usage = Vec::with_capacity(rows.len());
        for row in rows {
            usage.push(UsageRow {
                project_id: row.try_get("project_id")?,
                day: row.try_get("day")?,
                log_count: row.try_get("log_count")?,
                daily_quota: row.try_get("daily_quota")?,
            });
        }
        Ok(usage)
    }

    async fn route_rows(&self, since: DateTime<Utc>) -> Result<Vec<RouteRow>> {
        let rows = sqlx::query(
            r"
            SELECT DISTINCT project_id,
                   upper(attributes ->> 'method') || ' ' || (attributes ->> 'path') AS route
            FROM logs
            WHERE timestamp >= $1
              AND log_type = 'endpoint'
              AND attributes ->> 'method' IS NOT NULL
              AND attributes ->> 'path' IS NOT NULL
            ",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .context("failed to query endpoint routes")?;

        let mut routes = Vec::with_capacity(rows.len());
        for row in rows {
            routes.push(RouteRow {
                project_id: row.try_get("project_id")?,
                route: row.try_get("route")?,
            });
        }
        Ok(routes)
    }
}
