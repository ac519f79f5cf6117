use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{EnrichedLogEntry, ProjectId};

/// Durable destination for drained events.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Persists the whole batch or nothing. Returns the number of rows written.
    async fn write(&self, batch: &[EnrichedLogEntry]) -> Result<u64>;
}

/// Occurrences of one fingerprint within a batch, folded for a single upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GroupOccurrence {
    pub(crate) project_id: ProjectId,
    pub(crate) fingerprint: String,
    pub(crate) error_type: Option<String>,
    pub(crate) error_message: Option<String>,
    pub(crate) count: i64,
    pub(crate) first_seen: DateTime<Utc>,
    pub(crate) last_seen: DateTime<Utc>,
}

/// Folds fingerprinted events by `(project_id, fingerprint)` in first-seen
/// order. Type and message come from the latest occurrence.
pub(crate) fn group_occurrences(batch: &[EnrichedLogEntry]) -> Vec<GroupOccurrence> {
    let mut index: HashMap<(ProjectId, &str), usize> = HashMap::new();
    let mut groups: Vec<GroupOccurrence> = Vec::new();

    for event in batch {
        let Some(fingerprint) = event.error_fingerprint() else {
            continue;
        };
        let entry = event.entry();
        let timestamp = event.timestamp();

        match index.get(&(event.project_id(), fingerprint)).copied() {
            Some(position) => {
                let group = &mut groups[position];
                group.count += 1;
                group.first_seen = group.first_seen.min(timestamp);
                if timestamp >= group.last_seen {
                    group.last_seen = timestamp;
                    group.error_type.clone_from(&entry.error_type);
                    group.error_message.clone_from(&entry.error_message);
                }
            }
            None => {
                index.insert((event.project_id(), fingerprint), groups.len());
                groups.push(GroupOccurrence {
                    project_id: event.project_id(),
                    fingerprint: fingerprint.to_string(),
                    error_type: entry.error_type.clone(),
                    error_message: entry.error_message.clone(),
                    count: 1,
                    first_seen: timestamp,
                    last_seen: timestamp,
                });
            }
        }
    }
    groups
}

#[derive(Debug, Clone)]
pub struct PgLogSink {
    pool: PgPool,
}

impl PgLogSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_rows(
        tx: &mut Transaction<'_, Postgres>,
        batch: &[EnrichedLogEntry],
    ) -> Result<u64> {
        let mut project_ids = Vec::with_capacity(batch.len());
        let mut timestamps = Vec::with_capacity(batch.len());
        let mut ingested = Vec::with_capacity(batch.len());
        let mut levels = Vec::with_capacity(batch.len());
        let mut log_types = Vec::with_capacity(batch.len());
        let mut importance = Vec::with_capacity(batch.len());
        let mut environments = Vec::with_capacity(batch.len());
        let mut releases = Vec::with_capacity(batch.len());
        let mut messages = Vec::with_capacity(batch.len());
        let mut error_types = Vec::with_capacity(batch.len());
        let mut error_messages = Vec::with_capacity(batch.len());
        let mut stack_traces = Vec::with_capacity(batch.len());
        let mut fingerprints = Vec::with_capacity(batch.len());
        let mut attributes: Vec<Value> = Vec::with_capacity(batch.len());
        let mut sdk_names = Vec::with_capacity(batch.len());
        let mut sdk_versions = Vec::with_capacity(batch.len());
        let mut platforms = Vec::with_capacity(batch.len());

        for event in batch {
            let entry = event.entry();
            project_ids.push(event.project_id());
            timestamps.push(entry.timestamp);
            ingested.push(event.ingested_at());
            levels.push(entry.level.as_str());
            log_types.push(entry.log_type.as_str());
            importance.push(entry.importance.clone());
            environments.push(entry.environment.clone());
            releases.push(entry.release.clone());
            messages.push(entry.message.clone());
            error_types.push(entry.error_type.clone());
            error_messages.push(entry.error_message.clone());
            stack_traces.push(entry.stack_trace.clone());
            fingerprints.push(event.error_fingerprint().map(str::to_string));
            attributes.push(
                serde_json::to_value(&entry.attributes).context("failed to encode attributes")?,
            );
            sdk_names.push(entry.sdk_name.clone());
            sdk_versions.push(entry.sdk_version.clone());
            platforms.push(entry.platform.clone());
        }

        let result = sqlx::query(
            r"
            INSERT INTO logs
                (project_id, timestamp, ingested_at, level, log_type, importance,
                 environment, release, message, error_type, error_message, stack_trace,
                 error_fingerprint, attributes, sdk_name, sdk_version, platform)
            SELECT *
            FROM UNNEST($1::bigint[], $2::timestamptz[], $3::timestamptz[], $4::text[],
                        $5::text[], $6::text[], $7::text[], $8::text[], $9::text[],
                        $10::text[], $11::text[], $12::text[], $13::text[], $14::jsonb[],
                        $15::text[], $16::text[], $17::text[])
            ",
        )
        .bind(&project_ids)
        .bind(&timestamps)
        .bind(&ingested)
        .bind(&levels)
        .bind(&log_types)
        .bind(&importance)
        .bind(&environments)
        .bind(&releases)
        .bind(&messages)
        .bind(&error_types)
        .bind(&error_messages)
        .bind(&stack_traces)
        .bind(&fingerprints)
        .bind(&attributes)
        .bind(&sdk_names)
        .bind(&sdk_versions)
        .bind(&platforms)
        .execute(&mut **tx)
        .await
        .context("failed to batch insert logs")?;

        Ok(result.rows_affected())
    }

    async fn upsert_groups(
        tx: &mut Transaction<'_, Postgres>,
        groups: &[GroupOccurrence],
    ) -> Result<()> {
        for group in groups {
            sqlx::query(
                r"
                INSERT INTO error_groups
                    (project_id, fingerprint, error_type, error_message,
                     occurrence_count, first_seen, last_seen, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, 'unresolved')
                ON CONFLICT (project_id, fingerprint) DO UPDATE SET
                    occurrence_count = error_groups.occurrence_count + EXCLUDED.occurrence_count,
                    first_seen = LEAST(error_groups.first_seen, EXCLUDED.first_seen),
                    last_seen = GREATEST(error_groups.last_seen, EXCLUDED.last_seen),
                    error_type = COALESCE(EXCLUDED.error_type, error_groups.error_type),
                    error_message = COALESCE(EXCLUDED.error_message, error_groups.error_message)
                ",
            )
            .bind(group.project_id)
            .bind(&group.fingerprint)
            .bind(&group.error_type)
            .bind(&group.error_message)
            .bind(group.count)
            .bind(group.first_seen)
            .bind(group.last_seen)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("failed to upsert error group {}", group.fingerprint))?;
        }
        Ok(())
    }
}

#[async_trait]
impl LogSink for PgLogSink {
    async fn write(&self, batch: &[EnrichedLogEntry]) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let groups = group_occurrences(batch);

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let outcome = async {
            let written = Self::insert_rows(&mut tx, batch).await?;
            Self::upsert_groups(&mut tx, &groups).await?;
            Ok::<_, anyhow::Error>(written)
        }
        .await;

        match outcome {
            Ok(written) => {
                tx.commit().await.context("failed to commit log batch")?;
                Ok(written)
            }
            Err(error) => {
                tx.rollback()
                    .await
                    .context("failed to rollback log batch")?;
                Err(error)
            }
        }
    }
}
