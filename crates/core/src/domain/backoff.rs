// Backoff Domain Model (poll periods + adaptive idle interval)
//
// A productive cycle snaps the interval back to the minimum; every idle cycle
// doubles it from the minimum until the maximum caps it:
//
//   min=1s, max=10s
//   idle  idle  idle  idle  idle   busy
//    2s    4s    8s    10s   10s    1s

use std::time::Duration;

use super::error::{DomainError, Result};

/// Minimum poll period when none is configured (15s)
pub const DEFAULT_MINIMUM_PERIOD: Duration = Duration::from_secs(15);

/// Maximum poll period when none is configured (5 minutes)
pub const DEFAULT_MAXIMUM_PERIOD: Duration = Duration::from_secs(300);

/// Validated `[minimum, maximum]` poll period pair (`0 < minimum < maximum`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Periods {
    minimum: Duration,
    maximum: Duration,
}

impl Periods {
    pub fn new(minimum: Duration, maximum: Duration) -> Result<Self> {
        if minimum.is_zero() {
            return Err(DomainError::ZeroPeriod);
        }
        if minimum >= maximum {
            return Err(DomainError::InvalidPeriods { minimum, maximum });
        }
        Ok(Self { minimum, maximum })
    }

    /// Convenience constructor for whole seconds.
    pub fn from_secs(minimum: u64, maximum: u64) -> Result<Self> {
        Self::new(Duration::from_secs(minimum), Duration::from_secs(maximum))
    }

    pub fn minimum(&self) -> Duration {
        self.minimum
    }

    pub fn maximum(&self) -> Duration {
        self.maximum
    }
}

impl Default for Periods {
    /// 15s .. 300s
    fn default() -> Self {
        Self {
            minimum: DEFAULT_MINIMUM_PERIOD,
            maximum: DEFAULT_MAXIMUM_PERIOD,
        }
    }
}

/// Backoff state owned by exactly one backoff driver.
#[derive(Debug, Clone)]
pub struct AdaptiveInterval {
    periods: Periods,
    current: Duration,
    idle_streak: u32,
}

impl AdaptiveInterval {
    pub fn new(periods: Periods) -> Self {
        Self {
            periods,
            current: periods.minimum(),
            idle_streak: 0,
        }
    }

    /// Current sleep interval, always within `[minimum, maximum]`.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn idle_streak(&self) -> u32 {
        self.idle_streak
    }

    /// Feed one cycle outcome and return the interval to sleep before the next cycle.
    pub fn next(&mut self, work_done: bool) -> Duration {
        if work_done {
            self.idle_streak = 0;
            self.current = self.periods.minimum();
        } else {
            self.idle_streak = self.idle_streak.saturating_add(1);
            self.current = self.grown();
        }
        self.current
    }

    fn grown(&self) -> Duration {
        let min = self.periods.minimum().as_secs_f64();
        let max = self.periods.maximum();
        let exp = self.idle_streak.min(i32::MAX as u32) as i32;
        let secs = min * 2f64.powi(exp);

        if !secs.is_finite() || secs >= max.as_secs_f64() {
            max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
