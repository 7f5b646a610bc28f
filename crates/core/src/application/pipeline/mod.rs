// Pipeline Factory - wires queue, processor and throughput policy into runnables

mod setup;
mod shards;

pub use setup::{ProcessorFactory, QueueSetup, QueueSetupBuilder};
pub use shards::ShardedQueueWriter;

use crate::application::backoff::BackoffRunner;
use crate::application::dequeue::Dequeue;
use crate::application::initialize::InitializeStorageTask;
use crate::application::scaling::{QueueAutoScaler, ScalerConfig};
use crate::domain::{shard_names, DefaultThroughput, Periods, QueuePriority, QueueThroughput};
use crate::error::{AppError, Result};
use crate::port::{Processor, QueueTransport, ScaleUnitBuilder, TaskRef};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Build callback of one queue: a fresh poller, processor and backoff driver per unit
struct DequeueUnitBuilder<T> {
    queue: String,
    connection: String,
    transport: Arc<dyn QueueTransport<T>>,
    processor_factory: ProcessorFactory<T>,
    periods: Periods,
    next_unit: AtomicU64,
}

impl<T: Send + Sync + 'static> ScaleUnitBuilder for DequeueUnitBuilder<T> {
    fn build(&self) -> Result<Vec<TaskRef>> {
        let unit = self.next_unit.fetch_add(1, Ordering::Relaxed);
        let unit_name = format!("{}:unit-{unit}", self.queue);

        let dequeue = Dequeue::builder()
            .name(self.queue.clone())
            .poller(self.transport.poller(&self.connection, &self.queue)?)
            .processor((self.processor_factory)())
            .with_periods(self.periods)
            .build()?;
        let runner = BackoffRunner::new(unit_name, Arc::new(dequeue))?;

        debug!(queue = %self.queue, unit = unit, "Scale unit built");
        Ok(vec![Arc::new(runner) as TaskRef])
    }
}

/// Builds `[InitializeStorageTask, QueueAutoScaler]` per queue
pub struct DequeueFactory<T> {
    connection: String,
    transport: Arc<dyn QueueTransport<T>>,
    throughput: Arc<dyn QueueThroughput>,
}

impl<T: Send + Sync + 'static> DequeueFactory<T> {
    pub fn new(connection: impl Into<String>, transport: Arc<dyn QueueTransport<T>>) -> Result<Self> {
        let connection = connection.into();
        if connection.trim().is_empty() {
            return Err(AppError::Config(
                "pipeline factory requires a connection".to_string(),
            ));
        }
        Ok(Self {
            connection,
            transport,
            throughput: Arc::new(DefaultThroughput),
        })
    }

    pub fn with_throughput(mut self, throughput: Arc<dyn QueueThroughput>) -> Self {
        self.throughput = throughput;
        self
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Pipeline for one queue from its parts
    pub fn tasks<F>(&self, name: &str, processor_factory: F, priority: QueuePriority) -> Result<Vec<TaskRef>>
    where
        F: Fn() -> Arc<dyn Processor<T>> + Send + Sync + 'static,
    {
        let setup = QueueSetup::builder(name)
            .priority(priority)
            .processor_factory(processor_factory)
            .build()?;
        self.tasks_for_setup(setup)
    }

    /// `[InitializeStorageTask, QueueAutoScaler]`, in that order
    pub fn tasks_for_setup(&self, setup: QueueSetup<T>) -> Result<Vec<TaskRef>> {
        let connection = self.connection_for(&setup);
        let storage = self.transport.initializer(connection, setup.name())?;
        let initialize: TaskRef = Arc::new(InitializeStorageTask::new(setup.name(), storage));
        let scaler = self.autoscaler(&setup)?;
        Ok(vec![initialize, scaler])
    }

    /// Concatenated pipelines; the first invalid setup aborts the whole batch
    pub fn tasks_for_setups(
        &self,
        setups: impl IntoIterator<Item = QueueSetup<T>>,
    ) -> Result<Vec<TaskRef>> {
        let mut tasks = Vec::new();
        for setup in setups {
            tasks.extend(self.tasks_for_setup(setup)?);
        }
        Ok(tasks)
    }

    /// The autoscaler alone, without storage initialization
    pub fn dequeue(&self, setup: QueueSetup<T>) -> Result<TaskRef> {
        self.autoscaler(&setup)
    }

    /// `shard_count` pipelines named `{name}{i}`; zero means one pipeline named `name`
    pub fn sharded<P>(&self, name: &str, priority: QueuePriority, shard_count: usize) -> Result<Vec<TaskRef>>
    where
        P: Processor<T> + Default + 'static,
    {
        let setups = shard_names(name, shard_count)
            .into_iter()
            .map(|shard| {
                QueueSetup::builder(shard)
                    .priority(priority)
                    .processor_factory(|| Arc::new(P::default()) as Arc<dyn Processor<T>>)
                    .build()
            })
            .collect::<Result<Vec<_>>>()?;
        self.tasks_for_setups(setups)
    }

    fn connection_for<'a>(&'a self, setup: &'a QueueSetup<T>) -> &'a str {
        setup.connection().unwrap_or(&self.connection)
    }

    fn autoscaler(&self, setup: &QueueSetup<T>) -> Result<TaskRef> {
        let connection = self.connection_for(setup);
        let policy = self.throughput.policy(setup.priority());

        let builder = DequeueUnitBuilder {
            queue: setup.name().to_string(),
            connection: connection.to_string(),
            transport: Arc::clone(&self.transport),
            processor_factory: setup.processor_factory(),
            periods: policy.periods,
            next_unit: AtomicU64::new(0),
        };
        let scaler = QueueAutoScaler::new(
            setup.name(),
            self.transport.counter(connection, setup.name())?,
            Arc::new(builder),
            ScalerConfig::from(policy),
        )?;
        Ok(Arc::new(scaler))
    }
}
