// Sharded writer feeding a sharded SQLite pipeline

mod common;

use async_trait::async_trait;
use common::{eventually, job, FastThroughput, Fixture, Job, MEMORY};
use drover_core::application::{DequeueFactory, ShardedQueueWriter};
use drover_core::domain::QueuePriority;
use drover_core::error::Result;
use drover_core::port::{Processor, QueueWriter};

/// Sharded pipelines build one of these per unit through `Default`
#[derive(Default)]
struct AcceptAll;

#[async_trait]
impl Processor<Job> for AcceptAll {
    async fn process(&self, data: Job) -> Result<bool> {
        Ok(!data.name.is_empty())
    }
}

#[tokio::test]
async fn test_sharded_writer_and_pipeline() {
    let fixture = Fixture::new().await;
    let transport = fixture.dyn_transport();

    let writer = ShardedQueueWriter::new(transport.as_ref(), MEMORY, "events", 3).unwrap();
    assert_eq!(writer.shard_count(), 3);
    for id in 0..30 {
        writer.send(&job(id)).await.unwrap();
    }
    for shard in 0..3 {
        writer.send_to(shard, &job(100 + shard as u32)).await.unwrap();
    }
    assert!(writer.send_to(3, &job(999)).await.is_err());

    let mut total = 0;
    for shard in writer.names() {
        let depth = fixture.count(shard).await;
        assert!(depth >= 1, "shard {shard} received nothing");
        total += depth;
    }
    assert_eq!(total, 33);
    assert_eq!(fixture.count("events").await, 0);

    let tasks = DequeueFactory::new(MEMORY, transport)
        .unwrap()
        .with_throughput(std::sync::Arc::new(FastThroughput))
        .sharded::<AcceptAll>("events", QueuePriority::Medium, 3)
        .unwrap();
    assert_eq!(tasks.len(), 6);

    for task in &tasks {
        task.start().await.unwrap();
    }
    let fixture = &fixture;
    eventually(|| async move {
        let mut remaining = 0;
        for shard in ["events0", "events1", "events2"] {
            remaining += fixture.count(shard).await;
        }
        remaining == 0
    })
    .await;
    for task in &tasks {
        task.stop().await.unwrap();
        task.dispose().await.unwrap();
    }
}
