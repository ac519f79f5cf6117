use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::aggregation::{AggregationEngine, RollupKind, RouteSync};
use crate::partition::PartitionManager;
use crate::store::QueueDrainer;

/// A unit of recurring work. Errors mark the run as failed; they never stop
/// the schedule.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, now: DateTime<Utc>) -> Result<()>;
}

pub struct PartitionMaintenanceJob {
    manager: Arc<PartitionManager>,
    months_ahead: u32,
}

impl PartitionMaintenanceJob {
    #[must_use]
    pub fn new(manager: Arc<PartitionManager>, months_ahead: u32) -> Self {
        Self {
            manager,
            months_ahead,
        }
    }
}

#[async_trait]
impl ScheduledJob for PartitionMaintenanceJob {
    fn name(&self) -> &str {
        "partition_maintenance"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<()> {
        let today = now.date_naive();
        self.manager.ensure_all_from(today, self.months_ahead).await;

        // Only a missing current month fails the run; look-ahead gaps are retried next tick.
        let mut unconfirmed = Vec::new();
        for table in self.manager.tables() {
            if !self.manager.exists(table, today).await {
                unconfirmed.push(table.clone());
            }
        }
        if !unconfirmed.is_empty() {
            bail!("current-month partition missing for {unconfirmed:?}");
        }
        Ok(())
    }
}

pub struct RollupJob {
    engine: Arc<AggregationEngine>,
    kind: RollupKind,
}

impl RollupJob {
    #[must_use]
    pub fn new(engine: Arc<AggregationEngine>, kind: RollupKind) -> Self {
        Self { engine, kind }
    }
}

#[async_trait]
impl ScheduledJob for RollupJob {
    fn name(&self) -> &str {
        match self.kind {
            RollupKind::ErrorRate => "rollup_error_rate",
            RollupKind::LogVolume => "rollup_log_volume",
            RollupKind::TopErrors => "rollup_top_errors",
            RollupKind::Usage => "rollup_usage",
        }
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<()> {
        self.engine.refresh(self.kind, now).await?;
        Ok(())
    }
}

pub struct RouteSyncJob {
    sync: Arc<RouteSync>,
}

impl RouteSyncJob {
    #[must_use]
    pub fn new(sync: Arc<RouteSync>) -> Self {
        Self { sync }
    }
}

#[async_trait]
impl ScheduledJob for RouteSyncJob {
    fn name(&self) -> &str {
        "available_routes"
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<()> {
        let updated = self.sync.run(now).await?;
        info!(updated, "route sync run complete");
        Ok(())
    }
}

pub struct QueueDrainJob {
    drainer: Arc<QueueDrainer>,
}

impl QueueDrainJob {
    #[must_use]
    pub fn new(drainer: Arc<QueueDrainer>) -> Self {
        Self { drainer }
    }
}

#[async_trait]
impl ScheduledJob for QueueDrainJob {
    fn name(&self) -> &str {
        "queue_drain"
    }

    async fn run(&self, _now: DateTime<Utc>) -> Result<()> {
        self.drainer.drain_once().await?;
        Ok(())
    }
}
