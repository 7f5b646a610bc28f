// Autoscaler Control Loop - grows and shrinks the scale units of one queue

use crate::application::panic_guard::execute_guarded_async;
use crate::application::shutdown::{BackgroundLoop, ShutdownToken};
use crate::domain::{desired_units, DomainError, RunState, ScaleRange, ThroughputPolicy};
use crate::error::{AppError, Result};
use crate::port::{QueueCount, Runnable, ScaleUnitBuilder, TaskRef};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Scaling parameters of one autoscaler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalerConfig {
    pub messages_per_scale_unit: u64,
    pub scale: ScaleRange,
    pub check_every: Duration,
}

impl ScalerConfig {
    pub fn new(messages_per_scale_unit: u64, scale: ScaleRange, check_every: Duration) -> Result<Self> {
        if messages_per_scale_unit == 0 {
            return Err(DomainError::ZeroMessagesPerUnit.into());
        }
        if check_every.is_zero() {
            return Err(DomainError::ZeroCheckInterval.into());
        }
        Ok(Self {
            messages_per_scale_unit,
            scale,
            check_every,
        })
    }
}

impl From<ThroughputPolicy> for ScalerConfig {
    fn from(policy: ThroughputPolicy) -> Self {
        Self {
            messages_per_scale_unit: policy.messages_per_scale_unit,
            scale: policy.scale,
            check_every: policy.check_every,
        }
    }
}

/// Runnables produced by one build callback invocation
pub struct ScaleUnit {
    id: u64,
    members: Vec<TaskRef>,
}

impl ScaleUnit {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn members(&self) -> &[TaskRef] {
        &self.members
    }

    async fn start(&self, queue: &str) {
        for member in &self.members {
            let result = execute_guarded_async(member.name(), member.start())
                .await
                .flatten(member.name());
            if let Err(e) = result {
                error!(queue = %queue, task = %member.name(), error = %e, "Scale unit member failed to start");
            }
        }
    }

    async fn stop(&self, queue: &str) -> bool {
        let results = join_all(self.members.iter().map(|member| async move {
            execute_guarded_async(member.name(), member.stop())
                .await
                .flatten(member.name())
        }))
        .await;

        let mut all_stopped = true;
        for (member, result) in self.members.iter().zip(results) {
            match result {
                Ok(true) => {}
                Ok(false) => all_stopped = false,
                Err(e) => {
                    all_stopped = false;
                    error!(queue = %queue, task = %member.name(), error = %e, "Scale unit member failed to stop");
                }
            }
        }
        all_stopped
    }

    async fn dispose(&self, queue: &str) {
        for member in &self.members {
            let result = execute_guarded_async(member.name(), member.dispose())
                .await
                .flatten(member.name());
            if let Err(e) = result {
                error!(queue = %queue, task = %member.name(), error = %e, "Scale unit member failed to dispose");
            }
        }
    }
}

#[derive(Default)]
struct Roster {
    units: Vec<ScaleUnit>,
    next_id: u64,
}

struct Shared {
    name: String,
    counter: Arc<dyn QueueCount>,
    builder: Arc<dyn ScaleUnitBuilder>,
    config: ScalerConfig,
    roster: tokio::sync::Mutex<Roster>,
}

impl Shared {
    async fn check(&self) -> usize {
        let depth = match self.counter.approximate_count().await {
            Ok(depth) => depth,
            Err(e) => {
                warn!(queue = %self.name, error = %e, "Queue depth unavailable; skipping scale check");
                return self.roster.lock().await.units.len();
            }
        };
        let desired = desired_units(depth, self.config.messages_per_scale_unit, self.config.scale);
        self.resize(desired, Some(depth)).await
    }

    /// Holds the roster lock for the whole resize so resizes never interleave
    async fn resize(&self, desired: usize, depth: Option<u64>) -> usize {
        let mut roster = self.roster.lock().await;
        let from = roster.units.len();

        if desired > from {
            for _ in from..desired {
                let members = match self.builder.build() {
                    Ok(members) => members,
                    Err(e) => {
                        error!(queue = %self.name, error = %e, "Failed to build scale unit");
                        break;
                    }
                };
                let unit = ScaleUnit {
                    id: roster.next_id,
                    members,
                };
                roster.next_id += 1;
                unit.start(&self.name).await;
                roster.units.push(unit);
            }
            info!(queue = %self.name, depth = ?depth, from = from, to = roster.units.len(), "Scaled up");
        } else if desired < from {
            let excess = roster.units.split_off(desired);
            join_all(excess.iter().rev().map(|unit| async move {
                unit.stop(&self.name).await;
                unit.dispose(&self.name).await;
            }))
            .await;
            info!(queue = %self.name, depth = ?depth, from = from, to = desired, "Scaled down");
        } else {
            debug!(queue = %self.name, depth = ?depth, units = from, "Scale unchanged");
        }

        roster.units.len()
    }
}

async fn control_loop(shared: Arc<Shared>, mut shutdown: ShutdownToken) {
    let every = shared.config.check_every;
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                shared.check().await;
            }
            _ = shutdown.wait() => break,
        }
    }
    debug!(queue = %shared.name, "Scale check loop stopped");
}

/// Elastic roster of scale units for one logical queue
pub struct QueueAutoScaler {
    shared: Arc<Shared>,
    state: Mutex<RunState>,
    control: tokio::sync::Mutex<Option<BackgroundLoop>>,
    disposed: Mutex<bool>,
}

impl QueueAutoScaler {
    pub fn new(
        name: impl Into<String>,
        counter: Arc<dyn QueueCount>,
        builder: Arc<dyn ScaleUnitBuilder>,
        config: ScalerConfig,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::EmptyName("autoscaler name").into());
        }
        Ok(Self {
            shared: Arc::new(Shared {
                name,
                counter,
                builder,
                config,
                roster: tokio::sync::Mutex::new(Roster::default()),
            }),
            state: Mutex::new(RunState::NotStarted),
            control: tokio::sync::Mutex::new(None),
            disposed: Mutex::new(false),
        })
    }

    pub fn config(&self) -> ScalerConfig {
        self.shared.config
    }

    /// Number of scale units in the roster
    pub async fn units(&self) -> usize {
        self.shared.roster.lock().await.units.len()
    }

    /// Read the queue depth and resize the roster; returns the new roster size
    pub async fn check(&self) -> usize {
        self.shared.check().await
    }

    fn set_state(&self, state: RunState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.lock().map(|d| *d).unwrap_or(true)
    }

    async fn release_stopped_units(&self) {
        let stale = std::mem::take(&mut self.shared.roster.lock().await.units);
        for unit in stale {
            unit.dispose(&self.shared.name).await;
        }
    }
}

#[async_trait]
impl Runnable for QueueAutoScaler {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn state(&self) -> RunState {
        self.state.lock().map(|s| *s).unwrap_or(RunState::Stopped)
    }

    async fn start(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(AppError::InvalidState(format!(
                "{} is disposed and cannot start",
                self.shared.name
            )));
        }

        let mut control = self.control.lock().await;
        if control.is_some() {
            return Ok(());
        }

        // Units left over from a previous run were stopped; start fresh ones
        self.release_stopped_units().await;

        let minimum = self.shared.config.scale.minimum();
        let units = self.shared.resize(minimum, None).await;
        info!(queue = %self.shared.name, units = units, "Autoscaler started");

        let shared = Arc::clone(&self.shared);
        *control = Some(BackgroundLoop::spawn(move |token| control_loop(shared, token)));
        self.set_state(RunState::Running);
        Ok(())
    }

    async fn stop(&self) -> Result<bool> {
        if let Some(control) = self.control.lock().await.take() {
            if let Err(e) = control.stop(&self.shared.name, None).await {
                error!(queue = %self.shared.name, error = %e, "Scale check loop ended abnormally");
            }
        }

        let roster = self.shared.roster.lock().await;
        let results = join_all(
            roster
                .units
                .iter()
                .map(|unit| unit.stop(&self.shared.name)),
        )
        .await;
        drop(roster);

        self.set_state(RunState::Stopped);
        info!(queue = %self.shared.name, units = results.len(), "Autoscaler stopped");
        Ok(results.into_iter().all(|stopped| stopped))
    }

    async fn dispose(&self) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }
        if self.state().is_running() {
            self.stop().await?;
        }
        self.release_stopped_units().await;
        if let Ok(mut disposed) = self.disposed.lock() {
            *disposed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::queue::MockQueueCount;
    use crate::port::runnable::mocks::MockUnitBuilder;
    use std::sync::Mutex as StdMutex;

    fn config(min: usize, max: usize) -> ScalerConfig {
        ScalerConfig::new(100, ScaleRange::new(min, max).unwrap(), Duration::from_secs(60)).unwrap()
    }

    fn depths(values: Vec<u64>) -> MockQueueCount {
        let sequence = StdMutex::new(values.into_iter());
        let mut counter = MockQueueCount::new();
        counter
            .expect_approximate_count()
            .returning(move || Ok(sequence.lock().unwrap().next().unwrap_or(0)));
        counter
    }

    fn scaler(counter: MockQueueCount, builder: &Arc<MockUnitBuilder>, min: usize, max: usize) -> QueueAutoScaler {
        QueueAutoScaler::new(
            "companies",
            Arc::new(counter),
            Arc::clone(builder) as Arc<dyn ScaleUnitBuilder>,
            config(min, max),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_fills_roster_to_minimum() {
        let builder = Arc::new(MockUnitBuilder::new());
        let scaler = scaler(depths(vec![]), &builder, 2, 5);

        scaler.start().await.unwrap();
        assert_eq!(scaler.units().await, 2);
        assert_eq!(builder.running(), 2);
        assert_eq!(scaler.state(), RunState::Running);

        scaler.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_check_grows_by_delta_without_restarting_existing_units() {
        let builder = Arc::new(MockUnitBuilder::new());
        let scaler = scaler(depths(vec![350]), &builder, 2, 5);
        scaler.start().await.unwrap();

        assert_eq!(scaler.check().await, 4);
        let built = builder.built();
        assert_eq!(built.len(), 4);
        assert!(built.iter().all(|unit| unit.start_count() == 1));
        assert_eq!(builder.running(), 4);

        scaler.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_check_shrinks_newest_units_first() {
        let builder = Arc::new(MockUnitBuilder::new());
        let scaler = scaler(depths(vec![350, 0]), &builder, 2, 5);
        scaler.start().await.unwrap();
        scaler.check().await;

        assert_eq!(scaler.check().await, 2);
        let built = builder.built();
        assert_eq!(built[0].stop_count(), 0);
        assert_eq!(built[1].stop_count(), 0);
        assert_eq!((built[2].stop_count(), built[2].dispose_count()), (1, 1));
        assert_eq!((built[3].stop_count(), built[3].dispose_count()), (1, 1));
        assert_eq!(builder.running(), 2);

        scaler.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_depth_clamped_to_maximum() {
        let builder = Arc::new(MockUnitBuilder::new());
        let scaler = scaler(depths(vec![1_000_000]), &builder, 1, 3);
        scaler.start().await.unwrap();

        assert_eq!(scaler.check().await, 3);
        scaler.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_count_failure_skips_check() {
        let builder = Arc::new(MockUnitBuilder::new());
        let mut counter = MockQueueCount::new();
        counter
            .expect_approximate_count()
            .returning(|| Err(AppError::Transport("queue offline".to_string())));
        let scaler = scaler(counter, &builder, 2, 5);
        scaler.start().await.unwrap();

        assert_eq!(scaler.check().await, 2);
        assert_eq!(builder.built().len(), 2);
        scaler.dispose().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_check_runs_after_interval() {
        let builder = Arc::new(MockUnitBuilder::new());
        let scaler = scaler(depths(vec![500]), &builder, 1, 5);
        scaler.start().await.unwrap();
        assert_eq!(scaler.units().await, 1);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(scaler.units().await, 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(scaler.units().await, 5);

        scaler.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_stops_every_unit_and_dispose_is_idempotent() {
        let builder = Arc::new(MockUnitBuilder::new());
        let scaler = scaler(depths(vec![300]), &builder, 1, 5);
        scaler.start().await.unwrap();
        scaler.check().await;

        assert!(scaler.stop().await.unwrap());
        assert_eq!(builder.running(), 0);
        assert!(builder.built().iter().all(|unit| unit.stop_count() == 1));
        assert_eq!(scaler.state(), RunState::Stopped);

        scaler.dispose().await.unwrap();
        scaler.dispose().await.unwrap();
        assert!(builder.built().iter().all(|unit| unit.dispose_count() == 1));
        assert_eq!(scaler.units().await, 0);
        assert!(scaler.start().await.is_err());
    }

    #[tokio::test]
    async fn test_builder_failure_is_isolated() {
        let builder = Arc::new(MockUnitBuilder::failing());
        let scaler = scaler(depths(vec![]), &builder, 2, 5);

        scaler.start().await.unwrap();
        assert_eq!(scaler.units().await, 0);
        scaler.dispose().await.unwrap();
    }

    #[test]
    fn test_config_validation() {
        let scale = ScaleRange::new(1, 2).unwrap();
        assert!(ScalerConfig::new(0, scale, Duration::from_secs(1)).is_err());
        assert!(ScalerConfig::new(1, scale, Duration::ZERO).is_err());
    }
}
