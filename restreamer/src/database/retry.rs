//! Retry helpers for database writes.
//!
//! Writers from the poll loop, push notifications and the API can briefly
//! contend for the SQLite write lock. Those writes are retried with capped,
//! jittered exponential backoff; every other error returns immediately.

use std::future::Future;
use std::time::Duration;

use rand::random;
use tracing::debug;

use crate::{Error, Result};

/// Backoff policy for busy or locked SQLite errors.
#[derive(Debug, Clone, Copy)]
pub struct BusyRetry {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BusyRetry {
    fn default() -> Self {
        Self {
            max_retries: 8,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BusyRetry {
    /// Delay before retry number `attempt` (zero based), including up to 25% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;
        let backoff = base.saturating_mul(1u64 << attempt.min(20)).min(cap);
        let jitter = random::<u64>() % (backoff / 4 + 1);
        Duration::from_millis((backoff + jitter).min(cap))
    }

    pub async fn run<T, F, Fut>(&self, op_name: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if attempt >= self.max_retries || !is_busy(&err) {
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            attempt += 1;
            debug!(
                "{} hit a locked database, retry {}/{} in {:?}",
                op_name, attempt, self.max_retries, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), by code or by message.
fn is_busy(err: &Error) -> bool {
    let Error::DatabaseSqlx(err) = err else {
        return false;
    };
    if let sqlx::Error::Database(db_err) = err
        && matches!(db_err.code().as_deref(), Some("5" | "6"))
    {
        return true;
    }
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("database is locked") || msg.contains("database is busy")
}

/// Run `op` under the default [`BusyRetry`] policy.
pub async fn retry_on_sqlite_busy<T, F, Fut>(op_name: &'static str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    BusyRetry::default().run(op_name, op).await
}
