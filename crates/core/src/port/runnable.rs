// Runnable Ports (Interface)

use crate::domain::{RunState, TaskKind};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A supervised background task
#[async_trait]
pub trait Runnable: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> TaskKind {
        TaskKind::Persistent
    }

    fn state(&self) -> RunState;

    /// Begin work; returns once the task is running (or finished, for init tasks)
    async fn start(&self) -> Result<()>;

    /// Request stop; false when the task could not stop within its timeout
    async fn stop(&self) -> Result<bool>;

    /// Release resources; safe to call more than once
    async fn dispose(&self) -> Result<()>;
}

/// Shared handle to a runnable
pub type TaskRef = Arc<dyn Runnable>;

/// One unit of work driven on an adaptive schedule
#[async_trait]
pub trait BackoffRuns: Send + Sync {
    /// Returns true when work was found
    async fn run(&self) -> Result<bool>;

    fn minimum_period(&self) -> Duration;

    fn maximum_period(&self) -> Duration;
}

/// Action executed on a fixed period
#[async_trait]
pub trait Recurring: Send + Sync {
    async fn run(&self) -> Result<()>;
}

/// Builds the members of one new scale unit
pub trait ScaleUnitBuilder: Send + Sync {
    fn build(&self) -> Result<Vec<TaskRef>>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted runnable with call counters
    pub struct MockRunnable {
        name: String,
        kind: TaskKind,
        state: Mutex<RunState>,
        starts: AtomicUsize,
        stops: AtomicUsize,
        disposes: AtomicUsize,
        fail_start: bool,
        panic_start: bool,
        fail_stop: bool,
        release_delay: Duration,
        journal: Option<Arc<Mutex<Vec<String>>>>,
    }

    impl MockRunnable {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                kind: TaskKind::Persistent,
                state: Mutex::new(RunState::NotStarted),
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                disposes: AtomicUsize::new(0),
                fail_start: false,
                panic_start: false,
                fail_stop: false,
                release_delay: Duration::ZERO,
                journal: None,
            }
        }

        pub fn initialization(name: impl Into<String>) -> Self {
            Self {
                kind: TaskKind::Initialization,
                ..Self::new(name)
            }
        }

        pub fn failing_start(mut self) -> Self {
            self.fail_start = true;
            self
        }

        pub fn panicking_start(mut self) -> Self {
            self.panic_start = true;
            self
        }

        pub fn failing_stop(mut self) -> Self {
            self.fail_stop = true;
            self
        }

        /// Stop and dispose each take `delay` to complete
        pub fn slow_release(mut self, delay: Duration) -> Self {
            self.release_delay = delay;
            self
        }

        /// Append `"<event>:<name>"` to a shared journal on every call
        pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
            self.journal = Some(journal);
            self
        }

        pub fn start_count(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }

        pub fn stop_count(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }

        pub fn dispose_count(&self) -> usize {
            self.disposes.load(Ordering::SeqCst)
        }

        fn record(&self, event: &str) {
            if let Some(journal) = &self.journal {
                journal.lock().unwrap().push(format!("{event}:{}", self.name));
            }
        }
    }

    #[async_trait]
    impl Runnable for MockRunnable {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> TaskKind {
            self.kind
        }

        fn state(&self) -> RunState {
            *self.state.lock().unwrap()
        }

        async fn start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.record("start");
            if self.panic_start {
                panic!("{} exploded on start", self.name);
            }
            if self.fail_start {
                return Err(AppError::Internal(format!("{} refused to start", self.name)));
            }
            *self.state.lock().unwrap() = RunState::Running;
            Ok(())
        }

        async fn stop(&self) -> Result<bool> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.record("stop");
            if !self.release_delay.is_zero() {
                tokio::time::sleep(self.release_delay).await;
            }
            if self.fail_stop {
                return Err(AppError::Internal(format!("{} refused to stop", self.name)));
            }
            *self.state.lock().unwrap() = RunState::Stopped;
            Ok(true)
        }

        async fn dispose(&self) -> Result<()> {
            self.disposes.fetch_add(1, Ordering::SeqCst);
            self.record("dispose");
            if !self.release_delay.is_zero() {
                tokio::time::sleep(self.release_delay).await;
            }
            Ok(())
        }
    }

    /// Outcome of one scripted backoff cycle
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CycleOutcome {
        Work,
        Idle,
        Fail,
        Panic,
    }

    /// Backoff runs that replay a script, then report idle forever
    pub struct ScriptedRuns {
        script: Mutex<VecDeque<CycleOutcome>>,
        calls: AtomicUsize,
        minimum: Duration,
        maximum: Duration,
        cycle_time: Duration,
    }

    impl ScriptedRuns {
        pub fn new(minimum: Duration, maximum: Duration) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                minimum,
                maximum,
                cycle_time: Duration::ZERO,
            }
        }

        pub fn with_script(self, script: impl IntoIterator<Item = CycleOutcome>) -> Self {
            self.script.lock().unwrap().extend(script);
            self
        }

        /// Simulated processing time of every cycle
        pub fn with_cycle_time(mut self, cycle_time: Duration) -> Self {
            self.cycle_time = cycle_time;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BackoffRuns for ScriptedRuns {
        async fn run(&self) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.cycle_time.is_zero() {
                tokio::time::sleep(self.cycle_time).await;
            }
            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(CycleOutcome::Idle);
            match outcome {
                CycleOutcome::Work => Ok(true),
                CycleOutcome::Idle => Ok(false),
                CycleOutcome::Fail => Err(AppError::Transport("scripted failure".to_string())),
                CycleOutcome::Panic => panic!("scripted panic"),
            }
        }

        fn minimum_period(&self) -> Duration {
            self.minimum
        }

        fn maximum_period(&self) -> Duration {
            self.maximum
        }
    }

    /// Builds one `MockRunnable` per unit and keeps every built member
    #[derive(Default)]
    pub struct MockUnitBuilder {
        built: Mutex<Vec<Arc<MockRunnable>>>,
        fail: bool,
    }

    impl MockUnitBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn built(&self) -> Vec<Arc<MockRunnable>> {
            self.built.lock().unwrap().clone()
        }

        pub fn running(&self) -> usize {
            self.built()
                .iter()
                .filter(|unit| unit.state().is_running())
                .count()
        }
    }

    impl ScaleUnitBuilder for MockUnitBuilder {
        fn build(&self) -> Result<Vec<TaskRef>> {
            if self.fail {
                return Err(AppError::Config("unit builder failed".to_string()));
            }
            let mut built = self.built.lock().unwrap();
            let unit = Arc::new(MockRunnable::new(format!("unit-{}", built.len())));
            built.push(Arc::clone(&unit));
            Ok(vec![unit as TaskRef])
        }
    }
}
