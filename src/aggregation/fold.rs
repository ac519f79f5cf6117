//! In-memory folding of grouped query rows into per-tenant record lists.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::records::{
    ErrorRateRecord, LevelCountRow, LogVolumeRecord, RouteRow, TopErrorRecord, UsageRecord,
    UsageRow,
};
use crate::domain::{ErrorGroup, LogLevel, ProjectId};

pub type PerTenant<T> = BTreeMap<ProjectId, Vec<T>>;

/// Error and critical counts per bucket, newest bucket first. Other levels are ignored.
#[must_use]
pub fn error_rate(rows: &[LevelCountRow]) -> PerTenant<ErrorRateRecord> {
    let mut buckets: BTreeMap<ProjectId, BTreeMap<DateTime<Utc>, ErrorRateRecord>> =
        BTreeMap::new();
    for row in rows {
        let record = buckets
            .entry(row.project_id)
            .or_default()
            .entry(row.bucket)
            .or_insert_with(|| ErrorRateRecord {
                bucket: row.bucket,
                error_count: 0,
                critical_count: 0,
            });
        match row.level {
            LogLevel::Error => record.error_count += row.count,
            LogLevel::Critical => record.critical_count += row.count,
            _ => {}
        }
    }
    newest_first(buckets)
}

/// One zero-filled record per bucket, newest bucket first.
#[must_use]
pub fn log_volume(rows: &[LevelCountRow]) -> PerTenant<LogVolumeRecord> {
    let mut buckets: BTreeMap<ProjectId, BTreeMap<DateTime<Utc>, LogVolumeRecord>> =
        BTreeMap::new();
    for row in rows {
        buckets
            .entry(row.project_id)
            .or_default()
            .entry(row.bucket)
            .or_insert_with(|| LogVolumeRecord::empty(row.bucket))
            .add(row.level, row.count);
    }
    newest_first(buckets)
}

/// Highest occurrence count first, at most `limit` per tenant.
#[must_use]
pub fn top_errors(groups: Vec<ErrorGroup>, limit: usize) -> PerTenant<TopErrorRecord> {
    let mut ranked: PerTenant<TopErrorRecord> = BTreeMap::new();
    for group in groups {
        ranked.entry(group.project_id).or_default().push(TopErrorRecord {
            group_id: group.id,
            fingerprint: group.fingerprint,
            error_type: group.error_type,
            error_message: group.error_message,
            occurrence_count: group.occurrence_count,
            first_seen: group.first_seen,
            last_seen: group.last_seen,
        });
    }
    for records in ranked.values_mut() {
        records.sort_by(|a, b| {
            b.occurrence_count
                .cmp(&a.occurrence_count)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
        });
        records.truncate(limit);
    }
    ranked
}

/// Daily usage against quota, newest day first.
///
/// Tenants without a configured quota are measured against `fallback_quota`.
#[must_use]
pub fn usage(rows: &[UsageRow], fallback_quota: i64) -> PerTenant<UsageRecord> {
    let mut days: BTreeMap<ProjectId, BTreeMap<_, UsageRecord>> = BTreeMap::new();
    for row in rows {
        let quota = row.daily_quota.unwrap_or(fallback_quota);
        let record = days
            .entry(row.project_id)
            .or_default()
            .entry(row.day)
            .or_insert_with(|| UsageRecord {
                date: row.day,
                log_count: 0,
                daily_quota: quota,
                quota_used_percent: 0.0,
            });
        record.log_count += row.log_count;
        record.quota_used_percent = quota_used_percent(record.log_count, quota);
    }
    newest_first(days)
}

/// `count / quota * 100` rounded to two decimals; zero when the quota is zero.
#[must_use]
pub fn quota_used_percent(count: i64, quota: i64) -> f64 {
    if quota <= 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = count as f64 / quota as f64 * 100.0;
    (ratio * 100.0).round() / 100.0
}

#[must_use]
pub fn routes(rows: &[RouteRow]) -> BTreeMap<ProjectId, BTreeSet<String>> {
    let mut routes: BTreeMap<ProjectId, BTreeSet<String>> = BTreeMap::new();
    for row in rows {
        routes
            .entry(row.project_id)
            .or_default()
            .insert(row.route.clone());
    }
    routes
}

fn newest_first<K: Ord, T>(grouped: BTreeMap<ProjectId, BTreeMap<K, T>>) -> PerTenant<T> {
    grouped
        .into_iter()
        .map(|(project_id, buckets)| (project_id, buckets.into_values().rev().collect()))
        .collect()
}
