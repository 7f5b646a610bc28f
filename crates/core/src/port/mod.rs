// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod processor;
pub mod queue;
pub mod runnable;
pub mod task_factory;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use processor::Processor;
pub use queue::{Poller, QueueCount, QueueInit, QueueTransport, QueueWriter, Queued};
pub use runnable::{BackoffRuns, Recurring, Runnable, ScaleUnitBuilder, TaskRef};
pub use task_factory::TaskFactory;
pub use time_provider::TimeProvider;
