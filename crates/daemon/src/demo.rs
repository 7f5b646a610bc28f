// Demo Pipelines - company queues, a sharded producer and a scalable task pool

use crate::settings::Settings;
use async_trait::async_trait;
use drover_core::application::{
    BackoffRunner, DequeueFactory, QueueAutoScaler, RecurringRunner, ScalerConfig,
    ShardedQueueWriter,
};
use drover_core::domain::{QueuePriority, ScaleRange};
use drover_core::error::Result;
use drover_core::port::{
    BackoffRuns, Processor, QueueTransport, QueueWriter, Recurring, ScaleUnitBuilder, TaskFactory,
    TaskRef,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

const SCALABLE_CHECK_EVERY: Duration = Duration::from_secs(60);
const SCALABLE_MINIMUM_PERIOD: Duration = Duration::from_secs(20);
const SCALABLE_MAXIMUM_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyModel {
    pub id: Uuid,
    pub name: String,
}

/// Stores a dequeued company (here: logs it)
#[derive(Default)]
pub struct CompanyProcessor;

#[async_trait]
impl Processor<CompanyModel> for CompanyProcessor {
    async fn process(&self, data: CompanyModel) -> Result<bool> {
        info!(company_id = %data.id, name = %data.name, "Company saved");
        Ok(true)
    }
}

/// Writes a numbered company to a random shard on every run
pub struct CompanyShardQueuer {
    next: AtomicU64,
    writer: ShardedQueueWriter<CompanyModel>,
}

impl CompanyShardQueuer {
    pub fn new(writer: ShardedQueueWriter<CompanyModel>) -> Self {
        Self {
            next: AtomicU64::new(0),
            writer,
        }
    }
}

#[async_trait]
impl Recurring for CompanyShardQueuer {
    async fn run(&self) -> Result<()> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let company = CompanyModel {
            id: Uuid::new_v4(),
            name: format!("company-{n}"),
        };
        self.writer.send(&company).await
    }
}

/// Coin-flip workload, for watching backoff and scaling in the logs
pub struct ScalableTask;

#[async_trait]
impl BackoffRuns for ScalableTask {
    async fn run(&self) -> Result<bool> {
        let worked = rand::thread_rng().gen_bool(0.5);
        info!(worked = worked, "Scalable task ran");
        Ok(worked)
    }

    fn minimum_period(&self) -> Duration {
        SCALABLE_MINIMUM_PERIOD
    }

    fn maximum_period(&self) -> Duration {
        SCALABLE_MAXIMUM_PERIOD
    }
}

struct ScalableUnits {
    next_unit: AtomicU64,
}

impl ScaleUnitBuilder for ScalableUnits {
    fn build(&self) -> Result<Vec<TaskRef>> {
        let unit = self.next_unit.fetch_add(1, Ordering::Relaxed);
        let runner = BackoffRunner::new(format!("scalable:unit-{unit}"), Arc::new(ScalableTask))?;
        Ok(vec![Arc::new(runner) as TaskRef])
    }
}

/// Everything the demo host supervises, rebuilt on every load
pub struct DemoFactory<Q> {
    transport: Arc<Q>,
}

impl<Q> DemoFactory<Q>
where
    Q: QueueTransport<CompanyModel> + 'static,
{
    pub fn new(transport: Arc<Q>) -> Self {
        Self { transport }
    }

    fn build(&self, settings: &Settings) -> Result<Vec<TaskRef>> {
        let connection = settings.database_url();
        let queues = &settings.queues;
        let transport: Arc<dyn QueueTransport<CompanyModel>> = self.transport.clone();
        let factory = DequeueFactory::new(connection.clone(), Arc::clone(&transport))?;

        let mut tasks = factory.tasks(
            &queues.companies,
            || Arc::new(CompanyProcessor) as Arc<dyn Processor<CompanyModel>>,
            QueuePriority::Medium,
        )?;
        tasks.extend(factory.sharded::<CompanyProcessor>(
            &queues.shards,
            QueuePriority::Low,
            queues.shard_count,
        )?);

        let writer =
            ShardedQueueWriter::new(transport.as_ref(), &connection, &queues.shards, queues.shard_count)?;
        tasks.push(Arc::new(RecurringRunner::new(
            "company-shard-queuer",
            Arc::new(CompanyShardQueuer::new(writer)),
            Duration::from_secs(queues.queuer_period_secs),
        )?));

        tasks.push(Arc::new(QueueAutoScaler::new(
            "scalable",
            transport.counter(&connection, &queues.companies)?,
            Arc::new(ScalableUnits {
                next_unit: AtomicU64::new(0),
            }),
            ScalerConfig::new(
                1,
                ScaleRange::new(1, queues.scalable_max_units)?,
                SCALABLE_CHECK_EVERY,
            )?,
        )?));

        Ok(tasks)
    }
}

impl<Q> TaskFactory<Settings> for DemoFactory<Q>
where
    Q: QueueTransport<CompanyModel> + 'static,
{
    fn tasks(&self, context: Option<&Settings>) -> Option<Vec<TaskRef>> {
        let settings = context?;
        match self.build(settings) {
            Ok(tasks) => Some(tasks),
            Err(e) => {
                error!(error = %e, "Demo pipelines could not be built");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{LogFormat, QueueSettings};
    use drover_core::domain::TaskKind;
    use drover_core::port::queue::mocks::InMemoryTransport;
    use tokio_test::assert_ok;

    fn settings(shard_count: usize) -> Settings {
        Settings {
            database: "sqlite::memory:".to_string(),
            log_format: LogFormat::Pretty,
            log_dir: None,
            stagger_ms: 0,
            queues: QueueSettings {
                companies: "companies".to_string(),
                shards: "shards".to_string(),
                shard_count,
                queuer_period_secs: 10,
                scalable_max_units: 3,
            },
        }
    }

    #[test]
    fn test_no_settings_contributes_nothing() {
        let factory = DemoFactory::new(Arc::new(InMemoryTransport::<CompanyModel>::new()));
        assert!(factory.tasks(None).is_none());
    }

    #[test]
    fn test_demo_tasks() {
        let factory = DemoFactory::new(Arc::new(InMemoryTransport::<CompanyModel>::new()));
        let tasks = factory.tasks(Some(&settings(2))).unwrap();

        let names: Vec<&str> = tasks.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "initialize:companies",
                "companies",
                "initialize:shards0",
                "shards0",
                "initialize:shards1",
                "shards1",
                "company-shard-queuer",
                "scalable",
            ]
        );
        let init = tasks
            .iter()
            .filter(|t| t.kind() == TaskKind::Initialization)
            .count();
        assert_eq!(init, 3);
    }

    #[test]
    fn test_invalid_settings_yield_none() {
        let factory = DemoFactory::new(Arc::new(InMemoryTransport::<CompanyModel>::new()));
        let mut bad = settings(2);
        bad.queues.scalable_max_units = 0;
        assert!(factory.tasks(Some(&bad)).is_none());
    }

    #[tokio::test]
    async fn test_queuer_spreads_over_shards() {
        let transport = InMemoryTransport::<CompanyModel>::new();
        let writer =
            ShardedQueueWriter::<CompanyModel>::new(&transport, "memory", "shards", 2).unwrap();
        let queuer = CompanyShardQueuer::new(writer);

        for _ in 0..10 {
            assert_ok!(queuer.run().await);
        }

        let total = transport.queue("shards0").ready_len() + transport.queue("shards1").ready_len();
        assert_eq!(total, 10);
    }

    #[tokio::test]
    async fn test_company_processor_accepts() {
        let company = CompanyModel {
            id: Uuid::new_v4(),
            name: "acme".to_string(),
        };
        assert!(assert_ok!(CompanyProcessor.process(company).await));
    }

    #[test]
    fn test_company_wire_format() {
        let company = CompanyModel {
            id: Uuid::nil(),
            name: "acme".to_string(),
        };
        let json = serde_json::to_value(&company).unwrap();
        assert_eq!(json["name"], "acme");
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
    }
}
