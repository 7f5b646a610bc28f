// SQLite Queue - lease-based message queue over one table

use crate::error::map_sqlx_error;
use crate::migration::run_migrations;
use async_trait::async_trait;
use drover_core::error::{AppError, Result};
use drover_core::port::{IdProvider, Poller, QueueCount, QueueInit, QueueWriter, Queued, TimeProvider};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One named queue inside a SQLite database
///
/// A poll leases the oldest visible message for `lease` by moving its
/// `visible_at` forward and stamping a fresh receipt. Only the holder of the
/// current receipt can delete it; an expired lease makes it visible again.
pub struct SqliteQueue<T> {
    name: String,
    pool: SqlitePool,
    lease: Duration,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> SqliteQueue<T> {
    pub fn new(
        name: impl Into<String>,
        pool: SqlitePool,
        lease: Duration,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            pool,
            lease,
            time_provider,
            id_provider,
            _payload: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lease_millis(&self) -> i64 {
        i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX)
    }
}

/// A leased row; deleting requires the receipt it was leased with
pub struct SqliteMessage<T> {
    id: i64,
    queue: String,
    body: String,
    receipt: String,
    dequeue_count: i64,
    pool: SqlitePool,
    _payload: PhantomData<fn() -> T>,
}

impl<T> SqliteMessage<T> {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn receipt(&self) -> &str {
        &self.receipt
    }

    /// How many times this message has been leased, this lease included
    pub fn dequeue_count(&self) -> i64 {
        self.dequeue_count
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send + 'static> Queued<T> for SqliteMessage<T> {
    async fn data(&self) -> Result<Option<T>> {
        if self.body.trim().is_empty() {
            warn!(queue = %self.queue, message_id = self.id, "Message has an empty body");
            return Ok(None);
        }
        match serde_json::from_str(&self.body) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) => {
                warn!(
                    queue = %self.queue,
                    message_id = self.id,
                    dequeue_count = self.dequeue_count,
                    error = %e,
                    "Message body is not a valid payload"
                );
                Ok(None)
            }
        }
    }

    async fn delete(&self) -> Result<()> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?1 AND receipt = ?2")
            .bind(self.id)
            .bind(&self.receipt)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::Transport(format!(
                "lease on message {} in '{}' was lost before delete",
                self.id, self.queue
            )));
        }
        debug!(queue = %self.queue, message_id = self.id, "Message deleted");
        Ok(())
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send + 'static> Poller<T> for SqliteQueue<T> {
    async fn poll(&self) -> Result<Option<Box<dyn Queued<T>>>> {
        let now = self.time_provider.now_millis();
        let receipt = self.id_provider.generate_id();

        let row = sqlx::query(
            r#"
            UPDATE messages
            SET visible_at = ?1, receipt = ?2, dequeue_count = dequeue_count + 1
            WHERE id = (
                SELECT id FROM messages
                WHERE queue = ?3 AND visible_at <= ?4
                ORDER BY id
                LIMIT 1
            )
            RETURNING id, body, dequeue_count
            "#,
        )
        .bind(now.saturating_add(self.lease_millis()))
        .bind(&receipt)
        .bind(&self.name)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Box::new(SqliteMessage::<T> {
            id: row.try_get("id").map_err(map_sqlx_error)?,
            queue: self.name.clone(),
            body: row.try_get("body").map_err(map_sqlx_error)?,
            receipt,
            dequeue_count: row.try_get("dequeue_count").map_err(map_sqlx_error)?,
            pool: self.pool.clone(),
            _payload: PhantomData,
        })))
    }
}

#[async_trait]
impl<T: Send + 'static> QueueCount for SqliteQueue<T> {
    async fn approximate_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE queue = ?1")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl<T: Send + 'static> QueueInit for SqliteQueue<T> {
    async fn ensure_exists(&self) -> Result<bool> {
        run_migrations(&self.pool).await?;
        let result = sqlx::query("INSERT OR IGNORE INTO queues (name, created_at) VALUES (?1, ?2)")
            .bind(&self.name)
            .bind(self.time_provider.now_millis())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl<T: Serialize + Send + Sync + 'static> QueueWriter<T> for SqliteQueue<T> {
    async fn send(&self, message: &T) -> Result<()> {
        let body = serde_json::to_string(message)?;
        let now = self.time_provider.now_millis();
        sqlx::query(
            "INSERT INTO messages (queue, body, enqueued_at, visible_at) VALUES (?1, ?2, ?3, ?3)",
        )
        .bind(&self.name)
        .bind(body)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
