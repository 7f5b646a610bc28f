// Recurring Runner - fixed-period background action

use crate::application::constants::DEFAULT_STOP_TIMEOUT;
use crate::application::panic_guard::{execute_guarded_async, PanicGuardResult};
use crate::application::shutdown::{BackgroundLoop, ShutdownToken};
use crate::domain::{DomainError, RunState};
use crate::error::{AppError, Result};
use crate::port::{Recurring, Runnable};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Runs a [`Recurring`] action immediately on start and then every `period`
///
/// A run that overlaps the next tick delays it; runs never overlap.
pub struct RecurringRunner {
    name: String,
    action: Arc<dyn Recurring>,
    period: Duration,
    state: Mutex<RunState>,
    active: tokio::sync::Mutex<Option<BackgroundLoop>>,
    disposed: Mutex<bool>,
}

impl RecurringRunner {
    pub fn new(name: impl Into<String>, action: Arc<dyn Recurring>, period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(DomainError::ZeroPeriod.into());
        }
        Ok(Self {
            name: name.into(),
            action,
            period,
            state: Mutex::new(RunState::NotStarted),
            active: tokio::sync::Mutex::new(None),
            disposed: Mutex::new(false),
        })
    }

    pub fn period(&self) -> Duration {
        self.period
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

async fn repeat(name: String, action: Arc<dyn Recurring>, period: Duration, mut shutdown: ShutdownToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match execute_guarded_async(&name, action.run()).await {
                    PanicGuardResult::Success(Ok(())) => debug!(task = %name, "Recurring run finished"),
                    PanicGuardResult::Success(Err(e)) => {
                        error!(task = %name, error = %e, kind = e.as_label(), "Recurring run failed");
                    }
                    PanicGuardResult::Panicked(_) => {}
                }
            }
            _ = shutdown.wait() => break,
        }
    }
    info!(task = %name, "Recurring runner stopped");
}

#[async_trait]
impl Runnable for RecurringRunner {
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
            debug!(task = %self.name, "Recurring runner already running");
            return Ok(());
        }

        let (name, action, period) = (self.name.clone(), Arc::clone(&self.action), self.period);
        *active = Some(BackgroundLoop::spawn(move |token| repeat(name, action, period, token)));
        self.set_state(RunState::Running);
        info!(task = %self.name, period_ms = self.period.as_millis() as u64, "Recurring runner started");
        Ok(())
    }

    async fn stop(&self) -> Result<bool> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(true);
        };
        self.set_state(RunState::Stopped);
        active.stop(&self.name, Some(DEFAULT_STOP_TIMEOUT)).await
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tally {
        runs: AtomicUsize,
        fail_every_other: bool,
    }

    #[async_trait]
    impl Recurring for Tally {
        async fn run(&self) -> Result<()> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail_every_other && n % 2 == 0 {
                return Err(AppError::Processing("odd run".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_period() {
        let tally = Arc::new(Tally::default());
        let runner = RecurringRunner::new("producer", tally.clone(), Duration::from_secs(10)).unwrap();
        runner.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(tally.runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(tally.runs.load(Ordering::SeqCst), 3);

        assert!(runner.stop().await.unwrap());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(tally.runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_runs_do_not_end_the_loop() {
        let tally = Arc::new(Tally {
            fail_every_other: true,
            ..Tally::default()
        });
        let runner = RecurringRunner::new("producer", tally.clone(), Duration::from_secs(1)).unwrap();
        runner.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(tally.runs.load(Ordering::SeqCst), 5);
        assert_eq!(runner.state(), RunState::Running);
        runner.dispose().await.unwrap();
        assert_eq!(runner.state(), RunState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_keeps_single_loop() {
        let tally = Arc::new(Tally::default());
        let runner = RecurringRunner::new("producer", tally.clone(), Duration::from_secs(10)).unwrap();
        runner.start().await.unwrap();
        runner.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(tally.runs.load(Ordering::SeqCst), 2);
        assert!(runner.stop().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposed_runner_refuses_to_start() {
        let tally = Arc::new(Tally::default());
        let runner = RecurringRunner::new("producer", tally.clone(), Duration::from_secs(10)).unwrap();
        runner.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        runner.dispose().await.unwrap();
        runner.dispose().await.unwrap();

        let err = runner.start().await.unwrap_err();
        assert_eq!(err.as_label(), "invalid_state");
        assert_eq!(runner.state(), RunState::Stopped);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(tally.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_period_rejected() {
        let result = RecurringRunner::new("producer", Arc::new(Tally::default()), Duration::ZERO);
        assert!(matches!(result, Err(ref e) if e.is_configuration()));
    }
}
