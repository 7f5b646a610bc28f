// Shared fixtures for SQLite-backed scenarios
#![allow(dead_code)]

use drover_core::domain::{Periods, QueuePriority, QueueThroughput, ScaleRange, ThroughputPolicy};
use drover_core::port::QueueTransport;
use drover_infra_sqlite::{create_pool, run_migrations, SqliteTransport};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const MEMORY: &str = "sqlite::memory:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: u32,
    pub name: String,
}

pub fn job(id: u32) -> Job {
    Job {
        id,
        name: format!("job-{id}"),
    }
}

/// Fast policy so tests drain in milliseconds
pub struct FastThroughput;

impl QueueThroughput for FastThroughput {
    fn policy(&self, _priority: QueuePriority) -> ThroughputPolicy {
        ThroughputPolicy::new(
            2,
            ScaleRange::new(1, 3).unwrap(),
            Duration::from_millis(100),
            Periods::new(Duration::from_millis(10), Duration::from_millis(50)).unwrap(),
        )
        .unwrap()
    }
}

pub struct Fixture {
    pub pool: SqlitePool,
    pub transport: Arc<SqliteTransport>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_transport(SqliteTransport::new()).await
    }

    pub async fn with_transport(transport: SqliteTransport) -> Self {
        let pool = create_pool(MEMORY).await.unwrap();
        run_migrations(&pool).await.unwrap();
        transport.register(MEMORY, pool.clone()).unwrap();
        Self {
            pool,
            transport: Arc::new(transport),
        }
    }

    pub fn dyn_transport(&self) -> Arc<dyn QueueTransport<Job>> {
        self.transport.clone()
    }

    pub async fn count(&self, queue: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE queue = ?1")
            .bind(queue)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

/// Poll `check` every 10ms until it holds or five seconds pass
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}
