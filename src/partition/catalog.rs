use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use super::naming::is_valid_identifier;

/// Storage-side view of partition topology.
#[async_trait]
pub trait PartitionCatalog: Send + Sync {
    /// Whether a relation called `name` exists in the current schema.
    async fn partition_exists(&self, name: &str) -> Result<bool>;

    /// Idempotently creates `name` as a partition of `table` bound to `[start, end)`.
    async fn create_partition(
        &self,
        table: &str,
        name: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<()>;
}

/// Postgres declarative-partitioning catalog.
#[derive(Debug, Clone)]
pub struct PgPartitionCatalog {
    pool: PgPool,
}

impl PgPartitionCatalog {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PartitionCatalog for PgPartitionCatalog {
    async fn partition_exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query(
            r"
            SELECT EXISTS (
                SELECT 1
                FROM pg_catalog.pg_class c
                JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                WHERE c.relname = $1
                  AND n.nspname = current_schema()
            ) AS exists
            ",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .context("failed to query partition catalog")?;

        row.try_get("exists")
            .context("failed to read partition existence flag")
    }

    async fn create_partition(
        &self,
        table: &str,
        name: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<()> {
        // DDL cannot take bind parameters, so both identifiers are spliced in.
        ensure!(is_valid_identifier(table), "invalid table name: {table}");
        ensure!(is_valid_identifier(name), "invalid partition name: {name}");

        let statement = format!(
            "CREATE TABLE IF NOT EXISTS {name} PARTITION OF {table} \
             FOR VALUES FROM ('{start} 00:00:00+00') TO ('{end} 00:00:00+00')"
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        if let Err(error) = sqlx::query(&statement).execute(&mut *tx).await {
            tx.rollback()
                .await
                .context("failed to rollback partition transaction")?;
            return Err(anyhow::Error::new(error).context(format!("failed to create {name}")));
        }

        tx.commit()
            .await
            .context("failed to commit partition transaction")?;
        Ok(())
    }
}
