// Application Layer - Worker runtime: consume loop, backoff, scaling, lifecycle

pub mod backoff;
pub mod constants;
pub mod dequeue;
pub mod initialize;
pub mod lifecycle;
pub mod panic_guard;
pub mod pipeline;
pub mod recurring;
pub mod scaling;
pub mod shutdown;

// Re-exports
pub use backoff::BackoffRunner;
pub use dequeue::{Dequeue, DequeueBuilder};
pub use initialize::InitializeStorageTask;
pub use lifecycle::{RunReport, TaskManager};
pub use panic_guard::{execute_guarded_async, PanicGuardResult};
pub use pipeline::{DequeueFactory, ProcessorFactory, QueueSetup, QueueSetupBuilder, ShardedQueueWriter};
pub use recurring::RecurringRunner;
pub use scaling::{QueueAutoScaler, ScaleUnit, ScalerConfig};
pub use shutdown::{shutdown_channel, BackgroundLoop, ShutdownSender, ShutdownToken};
