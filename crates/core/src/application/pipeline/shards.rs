// Sharded Queue Writer - spreads messages over the shards of a logical queue

use crate::domain::{shard_names, validate_queue_name, QueueId};
use crate::error::{AppError, Result};
use crate::port::{QueueTransport, QueueWriter};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

/// Writes to one of the physical queues a sharded pipeline consumes
///
/// Shard names match `DequeueFactory::sharded`: zero shards is the plain queue.
pub struct ShardedQueueWriter<T> {
    names: Vec<QueueId>,
    writers: Vec<Arc<dyn QueueWriter<T>>>,
}

impl<T> ShardedQueueWriter<T> {
    pub fn new(
        transport: &dyn QueueTransport<T>,
        connection: &str,
        name: &str,
        shard_count: usize,
    ) -> Result<Self> {
        validate_queue_name(name)?;
        let names = shard_names(name, shard_count);
        let writers = names
            .iter()
            .map(|shard| transport.writer(connection, shard))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { names, writers })
    }

    pub fn shard_count(&self) -> usize {
        self.writers.len()
    }

    pub fn names(&self) -> &[QueueId] {
        &self.names
    }
}

impl<T: Sync> ShardedQueueWriter<T> {
    /// Write to an explicit shard
    pub async fn send_to(&self, shard: usize, message: &T) -> Result<()> {
        let writer = self.writers.get(shard).ok_or_else(|| {
            AppError::InvalidState(format!(
                "shard {shard} out of range (0..{})",
                self.writers.len()
            ))
        })?;
        writer.send(message).await?;
        debug!(queue = %self.names[shard], "Message written to shard");
        Ok(())
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> QueueWriter<T> for ShardedQueueWriter<T> {
    /// Write to a random shard
    async fn send(&self, message: &T) -> Result<()> {
        let shard = rand::thread_rng().gen_range(0..self.writers.len());
        self.send_to(shard, message).await
    }
}
