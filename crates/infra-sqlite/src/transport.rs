// SQLite Queue Transport - opens queues per (connection, name)

use crate::connection::create_lazy_pool;
use crate::queue::SqliteQueue;
use drover_core::error::{AppError, Result};
use drover_core::port::id_provider::UuidProvider;
use drover_core::port::time_provider::SystemTimeProvider;
use drover_core::port::{
    IdProvider, Poller, QueueCount, QueueInit, QueueTransport, QueueWriter, TimeProvider,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Default visibility timeout of a leased message (5 minutes)
pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);

/// Queue transport over SQLite databases addressed by connection URL
///
/// One pool is kept per connection string. Pools registered up front are used
/// as-is; any other connection string gets a lazily connecting pool.
pub struct SqliteTransport {
    pools: Mutex<HashMap<String, SqlitePool>>,
    lease: Duration,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
}

impl Default for SqliteTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteTransport {
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            lease: DEFAULT_LEASE,
            time_provider: Arc::new(SystemTimeProvider),
            id_provider: Arc::new(UuidProvider),
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    pub fn with_id_provider(mut self, id_provider: Arc<dyn IdProvider>) -> Self {
        self.id_provider = id_provider;
        self
    }

    /// Use an existing pool for `connection`
    pub fn register(&self, connection: impl Into<String>, pool: SqlitePool) -> Result<()> {
        let mut pools = self.pools()?;
        pools.insert(connection.into(), pool);
        Ok(())
    }

    fn pools(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SqlitePool>>> {
        self.pools
            .lock()
            .map_err(|_| AppError::Internal("sqlite pool registry poisoned".to_string()))
    }

    fn pool(&self, connection: &str) -> Result<SqlitePool> {
        let mut pools = self.pools()?;
        if let Some(pool) = pools.get(connection) {
            return Ok(pool.clone());
        }
        debug!(connection = %connection, "Opening lazy sqlite pool");
        let pool = create_lazy_pool(connection)?;
        pools.insert(connection.to_string(), pool.clone());
        Ok(pool)
    }

    /// Typed queue handle
    pub fn queue<T>(&self, connection: &str, name: &str) -> Result<SqliteQueue<T>> {
        if name.trim().is_empty() {
            return Err(AppError::Config("queue name must not be empty".to_string()));
        }
        Ok(SqliteQueue::new(
            name,
            self.pool(connection)?,
            self.lease,
            Arc::clone(&self.time_provider),
            Arc::clone(&self.id_provider),
        ))
    }
}

impl<T> QueueTransport<T> for SqliteTransport
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn poller(&self, connection: &str, name: &str) -> Result<Arc<dyn Poller<T>>> {
        Ok(Arc::new(self.queue::<T>(connection, name)?))
    }

    fn counter(&self, connection: &str, name: &str) -> Result<Arc<dyn QueueCount>> {
        Ok(Arc::new(self.queue::<T>(connection, name)?))
    }

    fn initializer(&self, connection: &str, name: &str) -> Result<Arc<dyn QueueInit>> {
        Ok(Arc::new(self.queue::<T>(connection, name)?))
    }

    fn writer(&self, connection: &str, name: &str) -> Result<Arc<dyn QueueWriter<T>>> {
        Ok(Arc::new(self.queue::<T>(connection, name)?))
    }
}
