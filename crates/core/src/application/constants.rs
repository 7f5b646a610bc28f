// Runtime constants
use std::time::Duration;

/// Delay between consecutive task starts in the lifecycle manager (1s)
pub const DEFAULT_START_STAGGER: Duration = Duration::from_secs(1);

/// How long a backoff driver waits for its in-flight cycle on stop (30s)
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Name used by the consume loop when the builder receives none
pub const DEFAULT_DEQUEUE_NAME: &str = "dequeue";
