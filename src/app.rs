use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use chrono::TimeDelta;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::{
    aggregation::{
        AggregationEngine, PgProjectRoutesStore, PgRollupSource, RedisSnapshotCache, RollupKind,
        RouteSync,
    },
    api,
    config::Config,
    enrich::Enricher,
    ingest::IngestService,
    observability::Telemetry,
    partition::{PartitionManager, PgPartitionCatalog},
    queue::{IngestionQueue, RedisListBackend},
    scheduler::{
        PartitionMaintenanceJob, QueueDrainJob, RollupJob, RouteSyncJob, Scheduler, Trigger,
    },
    store::{PgLogSink, QueueDrainer},
};

/// Shared state handed to the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

struct StateInner {
    telemetry: Telemetry,
    queue: Arc<IngestionQueue>,
    database: Option<PgPool>,
}

impl AppState {
    /// `database` is optional so the control plane can run against the
    /// in-process queue alone; readiness then only checks the queue backend.
    #[must_use]
    pub fn new(telemetry: Telemetry, queue: Arc<IngestionQueue>, database: Option<PgPool>) -> Self {
        Self {
            inner: Arc::new(StateInner {
                telemetry,
                queue,
                database,
            }),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.inner.telemetry
    }

    pub(crate) fn queue(&self) -> &IngestionQueue {
        &self.inner.queue
    }

    pub(crate) fn database(&self) -> Option<&PgPool> {
        self.inner.database.as_ref()
    }
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    pool: PgPool,
    queue: Arc<IngestionQueue>,
    ingest: Arc<IngestService>,
    partitions: Arc<PartitionManager>,
    engine: Arc<AggregationEngine>,
    scheduler: Arc<Scheduler>,
}

impl ComponentRegistry {
    /// Connects the stores and wires every component and scheduled job.
    ///
    /// Postgres pools connect lazily; Redis is dialled here so a wrong URL
    /// fails startup.
    ///
    /// # Errors
    /// Telemetry setup, pool configuration or the Redis connection failed.
    pub async fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let telemetry = Telemetry::new()?;
        let metrics = telemetry.metrics();

        let pool = pg_pool(&config, config.database_url())
            .context("failed to configure log database pool")?;
        let config_pool = if config.config_database_url() == config.database_url() {
            pool.clone()
        } else {
            pg_pool(&config, config.config_database_url())
                .context("failed to configure config database pool")?
        };

        let redis_client =
            redis::Client::open(config.redis_url()).context("invalid REDIS_URL")?;
        let redis = ConnectionManager::new(redis_client)
            .await
            .context("failed to connect to redis")?;

        let queue = Arc::new(IngestionQueue::new(
            Arc::new(RedisListBackend::new(redis.clone())),
            config.queue_max_depth(),
            Arc::clone(&metrics),
        ));
        let ingest = Arc::new(IngestService::new(
            Arc::new(Enricher::new()),
            Arc::clone(&queue),
        ));
        let partitions = Arc::new(PartitionManager::new(
            Arc::new(PgPartitionCatalog::new(pool.clone())),
            config.partition_tables().to_vec(),
            Arc::clone(&metrics),
        ));

        let source = Arc::new(PgRollupSource::new(pool.clone()));
        let engine = Arc::new(AggregationEngine::new(
            source.clone(),
            Arc::new(RedisSnapshotCache::new(redis)),
            config.rollup_settings(),
            Arc::clone(&metrics),
        ));
        let route_sync = Arc::new(RouteSync::new(
            source,
            Arc::new(PgProjectRoutesStore::new(config_pool)),
            TimeDelta::days(i64::from(config.routes_window_days())),
            Arc::clone(&metrics),
        ));
        let drainer = Arc::new(QueueDrainer::new(
            Arc::clone(&queue),
            Arc::clone(&partitions),
            Arc::new(PgLogSink::new(pool.clone())),
            config.queue_drain_batch_size(),
            Arc::clone(&metrics),
        ));

        let mut scheduler = Scheduler::new(config.scheduler_misfire_grace(), metrics);
        scheduler.register(
            Arc::new(PartitionMaintenanceJob::new(
                Arc::clone(&partitions),
                config.partition_months_ahead(),
            )),
            vec![
                Trigger::MonthlyAt {
                    day: 1,
                    hour: 0,
                    minute: 0,
                },
                Trigger::DailyAt { hour: 0, minute: 5 },
            ],
        );
        for (kind, interval) in [
            (RollupKind::ErrorRate, config.error_rate_interval()),
            (RollupKind::LogVolume, config.log_volume_interval()),
            (RollupKind::TopErrors, config.top_errors_interval()),
            (RollupKind::Usage, config.usage_stats_interval()),
        ] {
            scheduler.register(
                Arc::new(RollupJob::new(Arc::clone(&engine), kind)),
                vec![Trigger::Every(interval)],
            );
        }
        scheduler.register(
            Arc::new(RouteSyncJob::new(route_sync)),
            vec![Trigger::Every(config.routes_sync_interval())],
        );
        scheduler.register(
            Arc::new(QueueDrainJob::new(drainer)),
            vec![Trigger::Every(config.queue_drain_interval())],
        );

        Ok(Self {
            config,
            telemetry,
            pool,
            queue,
            ingest,
            partitions,
            engine,
            scheduler: Arc::new(scheduler),
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    #[must_use]
    pub fn partitions(&self) -> Arc<PartitionManager> {
        Arc::clone(&self.partitions)
    }

    /// Producer entry point for embedding callers.
    #[must_use]
    pub fn ingest(&self) -> Arc<IngestService> {
        Arc::clone(&self.ingest)
    }

    #[must_use]
    pub fn engine(&self) -> Arc<AggregationEngine> {
        Arc::clone(&self.engine)
    }

    #[must_use]
    pub fn state(&self) -> AppState {
        AppState::new(
            self.telemetry.clone(),
            Arc::clone(&self.queue),
            Some(self.pool.clone()),
        )
    }
}

fn pg_pool(config: &Config, url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .min_connections(config.db_min_connections())
        .acquire_timeout(config.db_acquire_timeout())
        .test_before_acquire(true)
        .connect_lazy(url)?;
    Ok(pool)
}

pub fn build_router(state: AppState) -> Router {
    api::router(state)
}
