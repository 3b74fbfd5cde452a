//! Source-state repository.
//!
//! Holds the single last-observed upstream state used for edge detection.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{SourceStateDbModel, StoredSourceState};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::domain::SourceState;

/// Source-state repository trait.
#[async_trait]
pub trait SourceStateRepository: Send + Sync {
    /// Last persisted state, `None` if nothing was ever recorded.
    async fn get_source_state(&self) -> Result<Option<StoredSourceState>>;
    /// Overwrite the marker. Last write wins.
    async fn put_source_state(&self, state: SourceState) -> Result<()>;
}

/// SQLx implementation of SourceStateRepository.
pub struct SqlxSourceStateRepository {
    pool: SqlitePool,
}

impl SqlxSourceStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceStateRepository for SqlxSourceStateRepository {
    async fn get_source_state(&self) -> Result<Option<StoredSourceState>> {
        let row = sqlx::query_as::<_, SourceStateDbModel>(
            "SELECT state, updated_at FROM source_state WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SourceStateDbModel::into_stored))
    }

    async fn put_source_state(&self, state: SourceState) -> Result<()> {
        retry_on_sqlite_busy("put_source_state", || async {
            sqlx::query(
                r#"
                INSERT INTO source_state (id, state, updated_at) VALUES (1, ?, ?)
                ON CONFLICT(id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at
                "#,
            )
            .bind(state.as_str())
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }
}
