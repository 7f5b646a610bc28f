// Lifecycle manager hosting SQLite pipelines and a recurring producer

mod common;

use async_trait::async_trait;
use common::{eventually, job, FastThroughput, Fixture, Job, MEMORY};
use drover_core::application::{DequeueFactory, RecurringRunner, TaskManager};
use drover_core::domain::{QueuePriority, RunState};
use drover_core::error::Result;
use drover_core::port::processor::mocks::RecordingProcessor;
use drover_core::port::{Processor, QueueTransport, QueueWriter, Recurring, TaskFactory, TaskRef};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Host context handed to factories on load
struct Context {
    queue: String,
}

/// Sends one job per tick
struct Producer {
    next: AtomicU32,
    writer: Arc<dyn QueueWriter<Job>>,
}

#[async_trait]
impl Recurring for Producer {
    async fn run(&self) -> Result<()> {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        self.writer.send(&job(id)).await
    }
}

struct PipelineFactory {
    transport: Arc<dyn QueueTransport<Job>>,
    processor: Arc<RecordingProcessor<Job>>,
    loads: AtomicUsize,
}

impl TaskFactory<Context> for PipelineFactory {
    fn tasks(&self, context: Option<&Context>) -> Option<Vec<TaskRef>> {
        let context = context?;
        self.loads.fetch_add(1, Ordering::SeqCst);

        let processor = Arc::clone(&self.processor);
        let mut tasks = DequeueFactory::new(MEMORY, Arc::clone(&self.transport))
            .ok()?
            .with_throughput(Arc::new(FastThroughput))
            .tasks(
                &context.queue,
                move || Arc::clone(&processor) as Arc<dyn Processor<Job>>,
                QueuePriority::High,
            )
            .ok()?;

        let producer = Producer {
            next: AtomicU32::new(0),
            writer: self.transport.writer(MEMORY, &context.queue).ok()?,
        };
        let runner =
            RecurringRunner::new("producer", Arc::new(producer), Duration::from_millis(20)).ok()?;
        tasks.push(Arc::new(runner));
        Some(tasks)
    }
}

fn manager(fixture: &Fixture) -> (TaskManager<Context>, Arc<PipelineFactory>) {
    let factory = Arc::new(PipelineFactory {
        transport: fixture.dyn_transport(),
        processor: Arc::new(RecordingProcessor::new(true)),
        loads: AtomicUsize::new(0),
    });
    let manager = TaskManager::<Context>::single(factory.clone() as Arc<dyn TaskFactory<Context>>)
        .with_stagger(Duration::from_millis(5));
    (manager, factory)
}

fn context() -> Context {
    Context {
        queue: "orders".to_string(),
    }
}

#[tokio::test]
async fn test_run_stop_dispose_over_sqlite() {
    let fixture = Fixture::new().await;
    let (manager, factory) = manager(&fixture);

    assert!(manager.load_and_prepare(Some(&context())));
    assert_eq!(manager.initialization_tasks().len(), 1);
    assert_eq!(manager.tasks().len(), 2);

    let report = manager.run().await;
    assert_eq!(report.started, 3);
    assert_eq!(report.attempted, 3);

    let seen = factory.processor.seen();
    eventually(|| {
        let seen = Arc::clone(&seen);
        async move { seen.lock().unwrap().len() >= 5 }
    })
    .await;

    let persistent = manager.tasks();
    assert_eq!(manager.stop().await, 2);
    assert!(persistent
        .iter()
        .all(|task| task.state() == RunState::Stopped));
    assert!(!manager.is_loaded());
    manager.dispose().await;

    // Factories run again on the next load
    assert!(manager.load_and_prepare(Some(&context())));
    assert_eq!(factory.loads.load(Ordering::SeqCst), 2);
    manager.dispose().await;
}

#[tokio::test]
async fn test_serve_until_shutdown() {
    let fixture = Fixture::new().await;
    let (manager, factory) = manager(&fixture);
    let seen = factory.processor.seen();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let probe: Arc<Mutex<Vec<Job>>> = Arc::clone(&seen);
    tokio::spawn(async move {
        loop {
            let processed = probe.lock().unwrap().len();
            if processed >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let _ = tx.send(());
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        manager.serve(Some(&context()), async {
            let _ = rx.await;
        }),
    )
    .await
    .expect("serve should return after shutdown");

    assert_eq!(report.started, report.attempted);
    assert!(seen.lock().unwrap().len() >= 3);
    assert!(manager.tasks().is_empty());
}

#[tokio::test]
async fn test_missing_context_loads_nothing() {
    let fixture = Fixture::new().await;
    let (manager, factory) = manager(&fixture);

    assert!(manager.load_and_prepare(None));
    assert!(manager.tasks().is_empty());
    assert_eq!(manager.run().await.attempted, 0);
    assert_eq!(factory.loads.load(Ordering::SeqCst), 0);
}
