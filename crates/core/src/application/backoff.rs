// Backoff Driver - runs a BackoffRuns on an adaptive sleep schedule

use crate::application::constants::DEFAULT_STOP_TIMEOUT;
use crate::application::panic_guard::{execute_guarded_async, PanicGuardResult};
use crate::application::shutdown::{BackgroundLoop, ShutdownToken};
use crate::domain::{AdaptiveInterval, Periods, RunState};
use crate::error::{AppError, Result};
use crate::port::{BackoffRuns, Runnable};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};

/// Drives one scale unit's consume loop
///
/// Cycles never overlap. The stop signal is observed between cycles and
/// during the sleep, never in the middle of a cycle.
pub struct BackoffRunner {
    name: String,
    runs: Arc<dyn BackoffRuns>,
    periods: Periods,
    stop_timeout: Duration,
    state: Mutex<RunState>,
    active: tokio::sync::Mutex<Option<BackgroundLoop>>,
    disposed: Mutex<bool>,
}

impl BackoffRunner {
    pub fn new(name: impl Into<String>, runs: Arc<dyn BackoffRuns>) -> Result<Self> {
        let periods = Periods::new(runs.minimum_period(), runs.maximum_period())?;
        Ok(Self {
            name: name.into(),
            runs,
            periods,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            state: Mutex::new(RunState::NotStarted),
            active: tokio::sync::Mutex::new(None),
            disposed: Mutex::new(false),
        })
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn periods(&self) -> Periods {
        self.periods
    }

    fn set_state(&self, state: RunState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.lock().map(|d| *d).unwrap_or(true)
    }
}

async fn drive(
    name: String,
    runs: Arc<dyn BackoffRuns>,
    periods: Periods,
    mut shutdown: ShutdownToken,
) {
    let mut interval = AdaptiveInterval::new(periods);
    info!(task = %name, "Backoff driver started");

    loop {
        if shutdown.is_shutdown() {
            break;
        }

        let worked = match execute_guarded_async(&name, runs.run()).await {
            PanicGuardResult::Success(Ok(worked)) => worked,
            PanicGuardResult::Success(Err(e)) => {
                error!(task = %name, error = %e, kind = e.as_label(), "Cycle failed");
                false
            }
            PanicGuardResult::Panicked(_) => false,
        };

        let delay = interval.next(worked);
        debug!(
            task = %name,
            worked = worked,
            delay_ms = delay.as_millis() as u64,
            "Cycle finished"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {},
            _ = shutdown.wait() => break,
        }
    }

    info!(task = %name, "Backoff driver stopped");
}

#[async_trait]
impl Runnable for BackoffRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> RunState {
        self.state.lock().map(|s| *s).unwrap_or(RunState::Stopped)
    }

    async fn start(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(AppError::InvalidState(format!(
                "{} is disposed and cannot start",
                self.name
            )));
        }

        let mut active = self.active.lock().await;
        if active.is_some() {
            debug!(task = %self.name, "Backoff driver already running");
            return Ok(());
        }

        let (name, runs, periods) = (self.name.clone(), Arc::clone(&self.runs), self.periods);
        *active = Some(BackgroundLoop::spawn(move |token| {
            drive(name, runs, periods, token)
        }));
        self.set_state(RunState::Running);
        Ok(())
    }

    async fn stop(&self) -> Result<bool> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(true);
        };

        self.set_state(RunState::Stopped);
        active.stop(&self.name, Some(self.stop_timeout)).await
    }

    async fn dispose(&self) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }
        self.stop().await?;
        if let Ok(mut disposed) = self.disposed.lock() {
            *disposed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::runnable::mocks::{CycleOutcome, ScriptedRuns};
    use tokio::time::{sleep, Instant};
    use tokio_test::{assert_err, assert_ok};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn runner(runs: &Arc<ScriptedRuns>) -> BackoffRunner {
        BackoffRunner::new("unit-0", Arc::clone(runs) as Arc<dyn BackoffRuns>).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_cycles_back_off_and_work_resets() {
        let runs = Arc::new(
            ScriptedRuns::new(secs(1), secs(10)).with_script([CycleOutcome::Work]),
        );
        let runner = runner(&runs);
        runner.start().await.unwrap();

        // t=0 work -> 1s, t=1 idle -> 2s, t=3 idle -> 4s, t=7 idle -> 8s, t=15
        sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.calls(), 1);
        sleep(secs(1)).await;
        assert_eq!(runs.calls(), 2);
        sleep(secs(2)).await;
        assert_eq!(runs.calls(), 3);
        sleep(secs(4)).await;
        assert_eq!(runs.calls(), 4);
        sleep(secs(7)).await;
        assert_eq!(runs.calls(), 4);
        sleep(secs(1)).await;
        assert_eq!(runs.calls(), 5);

        assert!(runner.stop().await.unwrap());
        assert_eq!(runner.state(), RunState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_and_panics_count_as_idle() {
        let runs = Arc::new(ScriptedRuns::new(secs(1), secs(10)).with_script([
            CycleOutcome::Fail,
            CycleOutcome::Panic,
            CycleOutcome::Work,
        ]));
        let runner = runner(&runs);
        runner.start().await.unwrap();

        // t=0 fail -> 2s, t=2 panic -> 4s, t=6 work -> 1s, t=7
        sleep(Duration::from_millis(7_500)).await;
        assert_eq!(runs.calls(), 4);
        assert_eq!(runner.state(), RunState::Running);

        assert!(runner.stop().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_cycle() {
        let runs = Arc::new(ScriptedRuns::new(secs(1), secs(10)).with_cycle_time(secs(5)));
        let runner = runner(&runs);
        runner.start().await.unwrap();
        sleep(secs(1)).await;

        let begun = Instant::now();
        assert!(runner.stop().await.unwrap());
        assert!(begun.elapsed() >= secs(4));
        assert_eq!(runs.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reports_timeout() {
        let runs = Arc::new(ScriptedRuns::new(secs(1), secs(10)).with_cycle_time(secs(60)));
        let runner = runner(&runs).with_stop_timeout(secs(1));
        runner.start().await.unwrap();
        sleep(Duration::from_millis(100)).await;

        assert!(!runner.stop().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_sleep() {
        let runs = Arc::new(ScriptedRuns::new(secs(100), secs(1_000)));
        let runner = runner(&runs);
        runner.start().await.unwrap();
        sleep(secs(1)).await;

        let begun = Instant::now();
        assert!(runner.stop().await.unwrap());
        assert!(begun.elapsed() < secs(1));
        assert_eq!(runs.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_single_loop() {
        let runs = Arc::new(ScriptedRuns::new(secs(1), secs(10)));
        let runner = runner(&runs);
        assert_ok!(runner.start().await);
        assert_ok!(runner.start().await);
        sleep(Duration::from_millis(500)).await;

        assert_eq!(runs.calls(), 1);
        assert_ok!(runner.dispose().await);
        assert_ok!(runner.dispose().await);
        assert_err!(runner.start().await);
    }

    #[test]
    fn test_invalid_periods_rejected() {
        let runs = Arc::new(ScriptedRuns::new(secs(10), secs(5)));
        let result = BackoffRunner::new("bad", runs as Arc<dyn BackoffRuns>);
        assert!(matches!(result, Err(ref e) if e.is_configuration()));
    }
}
