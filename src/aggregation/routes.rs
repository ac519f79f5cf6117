use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use super::fold;
use super::source::RollupSource;
use crate::domain::ProjectId;
use crate::observability::Metrics;

/// Authoritative per-project configuration holding the known route set.
#[async_trait]
pub trait ProjectRoutesStore: Send + Sync {
    /// Current route set of every project.
    async fn project_routes(&self) -> Result<HashMap<ProjectId, BTreeSet<String>>>;

    async fn update_project_routes(&self, project_id: ProjectId, routes: &[String]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct PgProjectRoutesStore {
    pool: PgPool,
}

impl PgProjectRoutesStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRoutesStore for PgProjectRoutesStore {
    async fn project_routes(&self) -> Result<HashMap<ProjectId, BTreeSet<String>>> {
        let rows = sqlx::query("SELECT id, available_routes FROM projects")
            .fetch_all(&self.pool)
            .await
            .context("failed to fetch project routes")?;

        let mut routes = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: ProjectId = row.try_get("id")?;
            let available: Vec<String> = row.try_get("available_routes")?;
            routes.insert(id, available.into_iter().collect());
        }
        Ok(routes)
    }

    async fn update_project_routes(&self, project_id: ProjectId, routes: &[String]) -> Result<()> {
        sqlx::query(
            r"
            UPDATE projects
            SET available_routes = $2,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(project_id)
        .bind(routes)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update routes for project {project_id}"))?;
        Ok(())
    }
}

/// Copies the endpoint signatures each project has sent into its configuration.
pub struct RouteSync {
    source: Arc<dyn RollupSource>,
    store: Arc<dyn ProjectRoutesStore>,
    window: TimeDelta,
    metrics: Arc<Metrics>,
}

impl RouteSync {
    #[must_use]
    pub fn new(
        source: Arc<dyn RollupSource>,
        store: Arc<dyn ProjectRoutesStore>,
        window: TimeDelta,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            source,
            store,
            window,
            metrics,
        }
    }

    /// Writes only projects whose observed route set differs from the stored one.
    /// Returns the number of projects updated.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<usize> {
        let rows = self.source.route_rows(now - self.window).await?;
        let observed = fold::routes(&rows);
        if observed.is_empty() {
            debug!("no endpoint routes observed");
            return Ok(0);
        }

        let stored = self.store.project_routes().await?;
        let mut updated = 0;
        for (project_id, routes) in observed {
            let Some(current) = stored.get(&project_id) else {
                debug!(project_id, "routes observed for unknown project");
                continue;
            };
            if *current == routes {
                continue;
            }
            let routes: Vec<String> = routes.into_iter().collect();
            self.store
                .update_project_routes(project_id, &routes)
                .await?;
            updated += 1;
        }

        self.metrics.routes_updated.inc_by(updated as u64);
        info!(updated, "available routes synchronized");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::aggregation::records::{LevelCountRow, RouteRow, UsageRow};
    use crate::domain::ErrorGroup;

    struct RoutesOnly(Vec<RouteRow>);

    #[async_trait]
    impl RollupSource for RoutesOnly {
        async fn error_rate_rows(&self, _: DateTime<Utc>) -> Result<Vec<LevelCountRow>> {
            Ok(Vec::new())
        }
        async fn log_volume_rows(&self, _: DateTime<Utc>) -> Result<Vec<LevelCountRow>> {
            Ok(Vec::new())
        }
        async fn top_error_groups(&self, _: DateTime<Utc>, _: usize) -> Result<Vec<ErrorGroup>> {
            Ok(Vec::new())
        }
        async fn usage_rows(&self, _: DateTime<Utc>) -> Result<Vec<UsageRow>> {
            Ok(Vec::new())
        }
        async fn route_rows(&self, _: DateTime<Utc>) -> Result<Vec<RouteRow>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        routes: HashMap<ProjectId, BTreeSet<String>>,
        updates: Mutex<Vec<(ProjectId, Vec<String>)>>,
    }

    #[async_trait]
    impl ProjectRoutesStore for FakeStore {
        async fn project_routes(&self) -> Result<HashMap<ProjectId, BTreeSet<String>>> {
            Ok(self.routes.clone())
        }

        async fn update_project_routes(&self, project_id: ProjectId, routes: &[String]) -> Result<()> {
            self.updates.lock().push((project_id, routes.to_vec()));
            Ok(())
        }
    }

    fn route(project_id: ProjectId, route: &str) -> RouteRow {
        RouteRow {
            project_id,
            route: route.into(),
        }
    }

    #[tokio::test]
    async fn only_changed_projects_are_written() {
        let source = Arc::new(RoutesOnly(vec![
            route(1, "GET /users"),
            route(1, "POST /users"),
            route(2, "GET /health"),
            route(99, "GET /ghost"),
        ]));
        let mut store = FakeStore::default();
        store
            .routes
            .insert(1, ["GET /users".to_string()].into_iter().collect());
        store
            .routes
            .insert(2, ["GET /health".to_string()].into_iter().collect());
        let store = Arc::new(store);

        let sync = RouteSync::new(
            source,
            store.clone(),
            TimeDelta::days(30),
            Arc::new(Metrics::detached().unwrap()),
        );
        assert_eq!(sync.run(Utc::now()).await.unwrap(), 1);
        assert_eq!(
            *store.updates.lock(),
            vec![(1, vec!["GET /users".to_string(), "POST /users".to_string()])]
        );
    }

    #[tokio::test]
    async fn nothing_observed_means_no_reads_or_writes() {
        let store = Arc::new(FakeStore::default());
        let sync = RouteSync::new(
            Arc::new(RoutesOnly(Vec::new())),
            store.clone(),
            TimeDelta::days(30),
            Arc::new(Metrics::detached().unwrap()),
        );
        assert_eq!(sync.run(Utc::now()).await.unwrap(), 0);
        assert!(store.updates.lock().is_empty());
    }
}
