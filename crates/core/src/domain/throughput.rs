// Throughput Domain Model (priority classes + scaling policy)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::backoff::Periods;
use super::error::{DomainError, Result};

/// Priority class of a queue pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePriority {
    #[default]
    Low,
    Medium,
    High,
}

impl QueuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueuePriority::Low => "low",
            QueuePriority::Medium => "medium",
            QueuePriority::High => "high",
        }
    }
}

impl fmt::Display for QueuePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueuePriority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(QueuePriority::Low),
            "medium" => Ok(QueuePriority::Medium),
            "high" => Ok(QueuePriority::High),
            other => Err(DomainError::ValidationError(format!(
                "unknown priority '{other}'"
            ))),
        }
    }
}

/// Inclusive bounds on the number of scale units (`1 <= minimum <= maximum`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleRange {
    minimum: usize,
    maximum: usize,
}

impl ScaleRange {
    pub fn new(minimum: usize, maximum: usize) -> Result<Self> {
        if minimum == 0 || minimum > maximum {
            return Err(DomainError::InvalidScale { minimum, maximum });
        }
        Ok(Self { minimum, maximum })
    }

    pub fn minimum(&self) -> usize {
        self.minimum
    }

    pub fn maximum(&self) -> usize {
        self.maximum
    }

    pub fn clamp(&self, units: usize) -> usize {
        units.clamp(self.minimum, self.maximum)
    }
}

/// Parameters the autoscaler and its scale units run with for one priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputPolicy {
    pub messages_per_scale_unit: u64,
    pub scale: ScaleRange,
    pub check_every: Duration,
    pub periods: Periods,
}

impl ThroughputPolicy {
    pub fn new(
        messages_per_scale_unit: u64,
        scale: ScaleRange,
        check_every: Duration,
        periods: Periods,
    ) -> Result<Self> {
        if messages_per_scale_unit == 0 {
            return Err(DomainError::ZeroMessagesPerUnit);
        }
        if check_every.is_zero() {
            return Err(DomainError::ZeroCheckInterval);
        }
        Ok(Self {
            messages_per_scale_unit,
            scale,
            check_every,
            periods,
        })
    }

    /// Number of units wanted for the observed depth
    pub fn desired_units(&self, depth: u64) -> usize {
        desired_units(depth, self.messages_per_scale_unit, self.scale)
    }
}

/// `clamp(ceil(depth / messages_per_unit), min, max)`
pub fn desired_units(depth: u64, messages_per_unit: u64, scale: ScaleRange) -> usize {
    let per_unit = messages_per_unit.max(1);
    let wanted = depth.div_ceil(per_unit);
    let wanted = usize::try_from(wanted).unwrap_or(usize::MAX);
    scale.clamp(wanted)
}

/// Lookup of the throughput policy for a priority class
pub trait QueueThroughput: Send + Sync {
    fn policy(&self, priority: QueuePriority) -> ThroughputPolicy;
}

/// Built-in policy table
///
/// | priority | msgs/unit | scale  | check every | poll periods |
/// |----------|-----------|--------|-------------|--------------|
/// | Low      | 1000      | 1..=2  | 5 min       | 15s..300s    |
/// | Medium   | 100       | 1..=5  | 2 min       | 5s..60s      |
/// | High     | 10        | 2..=10 | 1 min       | 1s..15s      |
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultThroughput;

impl QueueThroughput for DefaultThroughput {
    fn policy(&self, priority: QueuePriority) -> ThroughputPolicy {
        // Literal table rows are valid by construction
        let (per_unit, min, max, check_secs, min_period, max_period) = match priority {
            QueuePriority::Low => (1000, 1, 2, 300, 15, 300),
            QueuePriority::Medium => (100, 1, 5, 120, 5, 60),
            QueuePriority::High => (10, 2, 10, 60, 1, 15),
        };
        ThroughputPolicy {
            messages_per_scale_unit: per_unit,
            scale: ScaleRange {
                minimum: min,
                maximum: max,
            },
            check_every: Duration::from_secs(check_secs),
            periods: Periods::from_secs(min_period, max_period).unwrap_or_default(),
        }
    }
}
