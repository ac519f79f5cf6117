//! Monthly range partitions for time-series tables.
//!
//! Partitions are created ahead of need so that no write ever targets a month
//! without a partition. Failures are logged and reported as `false` or a zero
//! count; retrying is left to the caller (normally the next scheduled run).

mod cache;
mod catalog;
mod naming;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::observability::Metrics;

pub use cache::PartitionNameCache;
pub use catalog::{PartitionCatalog, PgPartitionCatalog};
pub use naming::{is_valid_identifier, month_start, partition_name, partition_range, shift_months};

pub struct PartitionManager {
    catalog: Arc<dyn PartitionCatalog>,
    known: PartitionNameCache,
    tables: Vec<String>,
    metrics: Arc<Metrics>,
}

impl PartitionManager {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn PartitionCatalog>,
        tables: Vec<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::with_cache(catalog, tables, PartitionNameCache::new(), metrics)
    }

    /// Shares an existing name cache, e.g. between a manager and a writer.
    #[must_use]
    pub fn with_cache(
        catalog: Arc<dyn PartitionCatalog>,
        tables: Vec<String>,
        known: PartitionNameCache,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            catalog,
            known,
            tables,
            metrics,
        }
    }

    /// Time-series tables maintained by [`ensure_all`](Self::ensure_all).
    #[must_use]
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    #[must_use]
    pub fn cache(&self) -> &PartitionNameCache {
        &self.known
    }

    /// Drops the fast-path cache; the next checks go to the catalog.
    pub fn clear_cache(&self) {
        self.known.clear();
    }

    #[must_use]
    pub fn partition_name(&self, table: &str, date: NaiveDate) -> String {
        partition_name(table, date)
    }

    #[must_use]
    pub fn partition_range(&self, date: NaiveDate) -> (NaiveDate, NaiveDate) {
        partition_range(date)
    }

    /// Cache first, then the catalog. Only positive answers are cached.
    pub async fn exists(&self, table: &str, date: NaiveDate) -> bool {
        let name = partition_name(table, date);
        if self.known.contains(&name) {
            return true;
        }

        match self.catalog.partition_exists(&name).await {
            Ok(true) => {
                self.known.insert(name);
                true
            }
            Ok(false) => false,
            Err(error) => {
                warn!(partition = %name, error = %error, "partition existence check failed");
                false
            }
        }
    }

    /// Issues the idempotent create statement for the month containing `date`.
    pub async fn create(&self, table: &str, date: NaiveDate) -> bool {
        let name = partition_name(table, date);
        let (start, end) = partition_range(date);

        match self.catalog.create_partition(table, &name, start, end).await {
            Ok(()) => {
                info!(partition = %name, %start, %end, "partition ensured");
                self.known.insert(name);
                self.metrics.partitions_created.inc();
                true
            }
            Err(error) => {
                error!(partition = %name, error = format!("{error:#}"), "partition creation failed");
                self.metrics.partition_failures.inc();
                false
            }
        }
    }

    pub async fn ensure_for_date(&self, table: &str, date: NaiveDate) -> bool {
        if self.exists(table, date).await {
            debug!(table, %date, "partition already present");
            return true;
        }
        self.create(table, date).await
    }

    pub async fn ensure_for_timestamp(&self, table: &str, timestamp: DateTime<Utc>) -> bool {
        self.ensure_for_date(table, timestamp.date_naive()).await
    }

    /// Ensures `start_date`'s month and the following `months_ahead` months.
    ///
    /// Returns how many partitions were created by this call.
    pub async fn ensure_range(&self, table: &str, start_date: NaiveDate, months_ahead: u32) -> usize {
        let mut created = 0;
        for offset in 0..=months_ahead {
            let Some(month) = shift_months(start_date, offset) else {
                warn!(table, %start_date, offset, "month offset out of range");
                break;
            };
            if self.exists(table, month).await {
                continue;
            }
            if self.create(table, month).await {
                created += 1;
            }
        }
        created
    }

    /// Runs [`ensure_range`](Self::ensure_range) from the current month for every table.
    pub async fn ensure_all(&self, months_ahead: u32) -> BTreeMap<String, usize> {
        self.ensure_all_from(Utc::now().date_naive(), months_ahead)
            .await
    }

    pub async fn ensure_all_from(
        &self,
        start_date: NaiveDate,
        months_ahead: u32,
    ) -> BTreeMap<String, usize> {
        let mut report = BTreeMap::new();
        for table in &self.tables {
            let created = self.ensure_range(table, start_date, months_ahead).await;
            report.insert(table.clone(), created);
        }
        info!(?report, months_ahead, "partition maintenance finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct FakeCatalog {
        existing: Mutex<HashSet<String>>,
        creates: Mutex<Vec<(String, NaiveDate, NaiveDate)>>,
        exists_calls: Mutex<usize>,
        fail_creates: bool,
    }

    #[async_trait]
    impl PartitionCatalog for FakeCatalog {
        async fn partition_exists(&self, name: &str) -> Result<bool> {
            *self.exists_calls.lock() += 1;
            Ok(self.existing.lock().contains(name))
        }

        async fn create_partition(
            &self,
            _table: &str,
            name: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<()> {
            if self.fail_creates {
                bail!("relation \"logs\" does not exist");
            }
            self.creates.lock().push((name.to_string(), start, end));
            self.existing.lock().insert(name.to_string());
            Ok(())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn manager(catalog: Arc<FakeCatalog>) -> PartitionManager {
        PartitionManager::new(
            catalog,
            vec!["logs".into(), "log_metrics".into()],
            Arc::new(Metrics::detached().expect("metrics")),
        )
    }

    #[tokio::test]
    async fn ensure_for_date_twice_creates_once() {
        let catalog = Arc::new(FakeCatalog::default());
        let manager = manager(Arc::clone(&catalog));

        assert!(manager.ensure_for_date("logs", date(2025, 12, 15)).await);
        assert!(manager.ensure_for_date("logs", date(2025, 12, 31)).await);

        let creates = catalog.creates.lock();
        assert_eq!(creates.len(), 1);
        assert_eq!(
            creates[0],
            ("logs_2025_12".to_string(), date(2025, 12, 1), date(2026, 1, 1))
        );
    }

    #[tokio::test]
    async fn cached_partitions_skip_the_catalog() {
        let catalog = Arc::new(FakeCatalog::default());
        let manager = manager(Arc::clone(&catalog));

        manager.ensure_for_date("logs", date(2025, 5, 2)).await;
        let calls_after_create = *catalog.exists_calls.lock();
        assert!(manager.exists("logs", date(2025, 5, 20)).await);
        assert_eq!(*catalog.exists_calls.lock(), calls_after_create);

        manager.clear_cache();
        assert!(manager.exists("logs", date(2025, 5, 20)).await);
        assert_eq!(*catalog.exists_calls.lock(), calls_after_create + 1);
    }

    #[tokio::test]
    async fn catalog_hits_populate_cache() {
        let catalog = Arc::new(FakeCatalog::default());
        catalog.existing.lock().insert("logs_2025_01".into());
        let manager = manager(Arc::clone(&catalog));

        assert!(manager.exists("logs", date(2025, 1, 9)).await);
        assert!(manager.cache().contains("logs_2025_01"));
        assert!(!manager.exists("logs", date(2025, 2, 9)).await);
        assert!(!manager.cache().contains("logs_2025_02"));
    }

    #[tokio::test]
    async fn ensure_range_is_inclusive_and_idempotent() {
        let catalog = Arc::new(FakeCatalog::default());
        let manager = manager(Arc::clone(&catalog));

        let created = manager.ensure_range("logs", date(2025, 11, 20), 3).await;
        assert_eq!(created, 4);
        let names: Vec<String> = catalog.creates.lock().iter().map(|c| c.0.clone()).collect();
        assert_eq!(
            names,
            vec!["logs_2025_11", "logs_2025_12", "logs_2026_01", "logs_2026_02"]
        );

        assert_eq!(manager.ensure_range("logs", date(2025, 11, 20), 3).await, 0);
    }

    #[tokio::test]
    async fn ensure_all_reports_per_table() {
        let catalog = Arc::new(FakeCatalog::default());
        catalog.existing.lock().insert("log_metrics_2025_03".into());
        let manager = manager(Arc::clone(&catalog));

        let report = manager.ensure_all_from(date(2025, 3, 1), 1).await;
        assert_eq!(report.get("logs"), Some(&2));
        assert_eq!(report.get("log_metrics"), Some(&1));
    }

    #[tokio::test]
    async fn failed_creation_is_reported_not_raised() {
        let catalog = Arc::new(FakeCatalog {
            fail_creates: true,
            ..FakeCatalog::default()
        });
        let manager = manager(Arc::clone(&catalog));

        assert!(!manager.ensure_for_date("logs", date(2025, 7, 1)).await);
        assert_eq!(manager.ensure_range("logs", date(2025, 7, 1), 2).await, 0);
        assert!(manager.cache().is_empty());
        assert_eq!(manager.metrics.partition_failures.get(), 4);
    }
}
