// Consume Loop - one poll / fetch / process / acknowledge cycle per run

use crate::application::constants::DEFAULT_DEQUEUE_NAME;
use crate::domain::Periods;
use crate::error::{AppError, Result};
use crate::port::{BackoffRuns, Poller, Processor};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Single-queue consume loop
///
/// Acknowledges at most once per cycle, and only after the processor returned
/// `Ok` (whatever its boolean) or the payload turned out to be poison. A
/// processor error leaves the message leased so the transport redelivers it.
pub struct Dequeue<T> {
    name: String,
    poller: Arc<dyn Poller<T>>,
    processor: Arc<dyn Processor<T>>,
    periods: Periods,
}

impl<T> Dequeue<T> {
    pub fn builder() -> DequeueBuilder<T> {
        DequeueBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn periods(&self) -> Periods {
        self.periods
    }
}

#[async_trait]
impl<T: Send + 'static> BackoffRuns for Dequeue<T> {
    async fn run(&self) -> Result<bool> {
        let Some(item) = self.poller.poll().await? else {
            debug!(queue = %self.name, "No message available");
            return Ok(false);
        };

        let Some(data) = item.data().await? else {
            warn!(queue = %self.name, "Discarding poison message (no payload)");
            item.delete().await?;
            return Ok(true);
        };

        let worked = self.processor.process(data).await?;
        item.delete().await?;

        debug!(queue = %self.name, worked = worked, "Message processed");
        Ok(worked)
    }

    fn minimum_period(&self) -> Duration {
        self.periods.minimum()
    }

    fn maximum_period(&self) -> Duration {
        self.periods.maximum()
    }
}

/// Builder for [`Dequeue`]
pub struct DequeueBuilder<T> {
    name: Option<String>,
    poller: Option<Arc<dyn Poller<T>>>,
    processor: Option<Arc<dyn Processor<T>>>,
    raw_periods: Option<(Duration, Duration)>,
    periods: Option<Periods>,
}

impl<T> Default for DequeueBuilder<T> {
    fn default() -> Self {
        Self {
            name: None,
            poller: None,
            processor: None,
            raw_periods: None,
            periods: None,
        }
    }
}

impl<T> DequeueBuilder<T> {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn poller(mut self, poller: Arc<dyn Poller<T>>) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn processor(mut self, processor: Arc<dyn Processor<T>>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Raw bounds, validated by `build`
    pub fn periods(mut self, minimum: Duration, maximum: Duration) -> Self {
        self.raw_periods = Some((minimum, maximum));
        self.periods = None;
        self
    }

    pub fn with_periods(mut self, periods: Periods) -> Self {
        self.periods = Some(periods);
        self.raw_periods = None;
        self
    }

    pub fn build(self) -> Result<Dequeue<T>> {
        let poller = self
            .poller
            .ok_or_else(|| AppError::Config("dequeue requires a poller".to_string()))?;
        let processor = self
            .processor
            .ok_or_else(|| AppError::Config("dequeue requires a processor".to_string()))?;

        let periods = match (self.periods, self.raw_periods) {
            (Some(periods), _) => periods,
            (None, Some((minimum, maximum))) => Periods::new(minimum, maximum)?,
            (None, None) => Periods::default(),
        };

        Ok(Dequeue {
            name: self
                .name
                .unwrap_or_else(|| DEFAULT_DEQUEUE_NAME.to_string()),
            poller,
            processor,
            periods,
        })
    }
}
