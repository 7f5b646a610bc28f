// Storage Initialization Task - ensures a queue exists before consumers start

use crate::domain::{RunState, TaskKind};
use crate::error::Result;
use crate::port::{QueueInit, Runnable};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::info;

/// One-shot initialization task; `start` completes once the queue exists
pub struct InitializeStorageTask {
    name: String,
    queue: String,
    storage: Arc<dyn QueueInit>,
    state: Mutex<RunState>,
}

impl InitializeStorageTask {
    pub fn new(queue: impl Into<String>, storage: Arc<dyn QueueInit>) -> Self {
        let queue = queue.into();
        Self {
            name: format!("initialize:{queue}"),
            queue,
            storage,
            state: Mutex::new(RunState::NotStarted),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl Runnable for InitializeStorageTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Initialization
    }

    fn state(&self) -> RunState {
        self.state.lock().map(|s| *s).unwrap_or(RunState::Stopped)
    }

    async fn start(&self) -> Result<()> {
        let created = self.storage.ensure_exists().await?;
        info!(queue = %self.queue, created = created, "Queue storage ready");
        if let Ok(mut state) = self.state.lock() {
            *state = RunState::Stopped;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<bool> {
        Ok(true)
    }

    async fn dispose(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::queue::mocks::InMemoryQueue;

    #[tokio::test]
    async fn test_start_creates_queue_once() {
        let queue = InMemoryQueue::<String>::new();
        let task = InitializeStorageTask::new("companies", Arc::new(queue.clone()));

        assert_eq!(task.kind(), TaskKind::Initialization);
        assert_eq!(task.name(), "initialize:companies");

        task.start().await.unwrap();
        assert!(queue.is_created());
        assert_eq!(task.state(), RunState::Stopped);

        // Idempotent on a second run
        task.start().await.unwrap();
        assert!(task.stop().await.unwrap());
    }
}
