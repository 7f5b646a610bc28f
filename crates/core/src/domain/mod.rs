// Domain Layer - Pure scheduling values and policies

pub mod backoff;
pub mod error;
pub mod queue;
pub mod task;
pub mod throughput;

// Re-exports
pub use backoff::{AdaptiveInterval, Periods};
pub use error::DomainError;
pub use queue::{shard_name, shard_names, validate_queue_name, QueueId};
pub use task::{RunState, TaskKind};
pub use throughput::{
    desired_units, DefaultThroughput, QueuePriority, QueueThroughput, ScaleRange, ThroughputPolicy,
};
