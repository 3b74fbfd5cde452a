//! Destination repository.
//!
//! Writes are narrow, per-field updates so that operator edits and reconciler
//! status changes do not overwrite each other's columns.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::database::models::DestinationDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::domain::{Destination, DestinationStatus, DestinationUpdate};
use crate::{Error, Result};

/// Destination repository trait.
#[async_trait]
pub trait DestinationRepository: Send + Sync {
    async fn get_destination(&self, id: &str) -> Result<Destination>;
    async fn list_destinations(&self) -> Result<Vec<Destination>>;
    async fn list_destinations_page(&self, limit: u32, offset: u32) -> Result<Vec<Destination>>;
    async fn count_destinations(&self) -> Result<u64>;
    /// Enabled destinations whose status is not `active`.
    async fn list_startable(&self) -> Result<Vec<Destination>>;
    async fn list_by_status(&self, status: DestinationStatus) -> Result<Vec<Destination>>;
    /// Enabled destinations a LIVE poll should drive again: those left `starting`
    /// and inactive ones whose last start attempt failed.
    async fn list_retryable(&self) -> Result<Vec<Destination>>;
    async fn create_destination(&self, destination: &Destination) -> Result<()>;
    /// Update operator-owned fields only and return the fresh record.
    ///
    /// An attached pipeline is marked stale when the update reshapes it.
    async fn update_settings(&self, id: &str, update: &DestinationUpdate) -> Result<Destination>;
    /// Move `from -> to` only if the stored status is still `from`.
    ///
    /// Returns `false` when another writer changed the status first.
    async fn transition_status(
        &self,
        id: &str,
        from: DestinationStatus,
        to: DestinationStatus,
    ) -> Result<bool>;
    /// Record pipeline refs and set `starting`, only if the stored channel ref
    /// still equals `expected_channel_ref`.
    async fn attach_pipeline(
        &self,
        id: &str,
        expected_channel_ref: Option<&str>,
        channel_ref: &str,
        input_ref: &str,
    ) -> Result<bool>;
    /// Forget the pipeline refs of an inactive destination, only if the stored
    /// channel ref still equals `expected_channel_ref`.
    async fn detach_pipeline(&self, id: &str, expected_channel_ref: &str) -> Result<bool>;
    async fn set_status(&self, id: &str, status: DestinationStatus) -> Result<()>;
    async fn set_start_retry(&self, id: &str, retry: bool) -> Result<()>;
    async fn delete_destination(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of DestinationRepository.
pub struct SqlxDestinationRepository {
    pool: SqlitePool,
}

impl SqlxDestinationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn into_domain(rows: Vec<DestinationDbModel>) -> Result<Vec<Destination>> {
        rows.into_iter().map(Destination::try_from).collect()
    }
}

#[async_trait]
impl DestinationRepository for SqlxDestinationRepository {
    async fn get_destination(&self, id: &str) -> Result<Destination> {
        sqlx::query_as::<_, DestinationDbModel>("SELECT * FROM destinations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Destination", id))?
            .try_into()
    }

    async fn list_destinations(&self) -> Result<Vec<Destination>> {
        let rows = sqlx::query_as::<_, DestinationDbModel>(
            "SELECT * FROM destinations ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Self::into_domain(rows)
    }

    async fn list_destinations_page(&self, limit: u32, offset: u32) -> Result<Vec<Destination>> {
        let rows = sqlx::query_as::<_, DestinationDbModel>(
            "SELECT * FROM destinations ORDER BY created_at, id LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;
        Self::into_domain(rows)
    }

    async fn count_destinations(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM destinations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn list_startable(&self) -> Result<Vec<Destination>> {
        let rows = sqlx::query_as::<_, DestinationDbModel>(
            "SELECT * FROM destinations WHERE enabled = 1 AND status != ? ORDER BY created_at, id",
        )
        .bind(DestinationStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await?;
        Self::into_domain(rows)
    }

    async fn list_by_status(&self, status: DestinationStatus) -> Result<Vec<Destination>> {
        let rows = sqlx::query_as::<_, DestinationDbModel>(
            "SELECT * FROM destinations WHERE status = ? ORDER BY created_at, id",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        Self::into_domain(rows)
    }

    async fn list_retryable(&self) -> Result<Vec<Destination>> {
        let rows = sqlx::query_as::<_, DestinationDbModel>(
            r#"
            SELECT * FROM destinations
            WHERE enabled = 1 AND (status = ? OR (status = ? AND start_retry = 1))
            ORDER BY created_at, id
            "#,
        )
        .bind(DestinationStatus::Starting.as_str())
        .bind(DestinationStatus::Inactive.as_str())
        .fetch_all(&self.pool)
        .await?;
        Self::into_domain(rows)
    }

    async fn create_destination(&self, destination: &Destination) -> Result<()> {
        let row = DestinationDbModel::from(destination);
        retry_on_sqlite_busy("create_destination", || async {
            sqlx::query(
                r#"
                INSERT INTO destinations (
                    id, platform, name, ingest_url, stream_key, enabled, vertical_mode,
                    status, pipeline_channel_ref, pipeline_input_ref, start_retry,
                    pipeline_stale, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.platform)
            .bind(&row.name)
            .bind(&row.ingest_url)
            .bind(&row.stream_key)
            .bind(row.enabled)
            .bind(&row.vertical_mode)
            .bind(&row.status)
            .bind(&row.pipeline_channel_ref)
            .bind(&row.pipeline_input_ref)
            .bind(row.start_retry)
            .bind(row.pipeline_stale)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn update_settings(&self, id: &str, update: &DestinationUpdate) -> Result<Destination> {
        if update.is_empty() {
            return self.get_destination(id).await;
        }

        retry_on_sqlite_busy("update_destination_settings", || async {
            let mut tx = self.pool.begin().await?;
            let current: Destination = sqlx::query_as::<_, DestinationDbModel>(
                "SELECT * FROM destinations WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::not_found("Destination", id))?
            .try_into()?;

            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE destinations SET ");
            let mut fields = query.separated(", ");
            if let Some(name) = &update.name {
                fields.push("name = ").push_bind_unseparated(name.clone());
            }
            if let Some(url) = &update.ingest_url {
                fields.push("ingest_url = ").push_bind_unseparated(url.clone());
            }
            if let Some(key) = &update.stream_key {
                fields
                    .push("stream_key = ")
                    .push_bind_unseparated(key.expose().to_string());
            }
            if let Some(enabled) = update.enabled {
                fields.push("enabled = ").push_bind_unseparated(enabled);
            }
            if let Some(mode) = update.vertical_mode {
                fields
                    .push("vertical_mode = ")
                    .push_bind_unseparated(mode.to_string());
            }
            if current.has_pipeline() && update.reshapes_pipeline(&current) {
                fields.push("pipeline_stale = 1");
            }
            fields.push("updated_at = ").push_bind_unseparated(now_ms());
            query.push(" WHERE id = ").push_bind(id.to_string());

            query.build().execute(&mut *tx).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        self.get_destination(id).await
    }

    async fn transition_status(
        &self,
        id: &str,
        from: DestinationStatus,
        to: DestinationStatus,
    ) -> Result<bool> {
        from.transition_to(to)?;

        let result = retry_on_sqlite_busy("transition_destination_status", || async {
            Ok(sqlx::query(
                "UPDATE destinations SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            )
            .bind(to.as_str())
            .bind(now_ms())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?)
        })
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn attach_pipeline(
        &self,
        id: &str,
        expected_channel_ref: Option<&str>,
        channel_ref: &str,
        input_ref: &str,
    ) -> Result<bool> {
        let result = retry_on_sqlite_busy("attach_destination_pipeline", || async {
            Ok(sqlx::query(
                r#"
                UPDATE destinations
                SET pipeline_channel_ref = ?, pipeline_input_ref = ?, status = ?,
                    pipeline_stale = 0, updated_at = ?
                WHERE id = ? AND pipeline_channel_ref IS ?
                "#,
            )
            .bind(channel_ref)
            .bind(input_ref)
            .bind(DestinationStatus::Starting.as_str())
            .bind(now_ms())
            .bind(id)
            .bind(expected_channel_ref)
            .execute(&self.pool)
            .await?)
        })
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn detach_pipeline(&self, id: &str, expected_channel_ref: &str) -> Result<bool> {
        let result = retry_on_sqlite_busy("detach_destination_pipeline", || async {
            Ok(sqlx::query(
                r#"
                UPDATE destinations
                SET pipeline_channel_ref = NULL, pipeline_input_ref = NULL,
                    pipeline_stale = 0, updated_at = ?
                WHERE id = ? AND status = ? AND pipeline_channel_ref = ?
                "#,
            )
            .bind(now_ms())
            .bind(id)
            .bind(DestinationStatus::Inactive.as_str())
            .bind(expected_channel_ref)
            .execute(&self.pool)
            .await?)
        })
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_status(&self, id: &str, status: DestinationStatus) -> Result<()> {
        let result = retry_on_sqlite_busy("set_destination_status", || async {
            Ok(
                sqlx::query("UPDATE destinations SET status = ?, updated_at = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(now_ms())
                    .bind(id)
                    .execute(&self.pool)
                    .await?,
            )
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Destination", id));
        }
        Ok(())
    }

    async fn set_start_retry(&self, id: &str, retry: bool) -> Result<()> {
        let result = retry_on_sqlite_busy("set_destination_start_retry", || async {
            Ok(
                sqlx::query("UPDATE destinations SET start_retry = ?, updated_at = ? WHERE id = ?")
                    .bind(retry)
                    .bind(now_ms())
                    .bind(id)
                    .execute(&self.pool)
                    .await?,
            )
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Destination", id));
        }
        Ok(())
    }

    async fn delete_destination(&self, id: &str) -> Result<()> {
        let result = retry_on_sqlite_busy("delete_destination", || async {
            Ok(sqlx::query("DELETE FROM destinations WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Destination", id));
        }
        Ok(())
    }
}
