// Processor Port (Interface)

use crate::error::Result;
use async_trait::async_trait;

/// Business handler for one dequeued payload
#[async_trait]
pub trait Processor<T>: Send + Sync {
    /// Returns true when useful work was done
    async fn process(&self, data: T) -> Result<bool>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::{Arc, Mutex};

    /// Records every payload and answers with a fixed outcome
    pub struct RecordingProcessor<T> {
        seen: Arc<Mutex<Vec<T>>>,
        outcome: bool,
        fail: bool,
    }

    impl<T> RecordingProcessor<T> {
        pub fn new(outcome: bool) -> Self {
            Self {
                seen: Arc::new(Mutex::new(Vec::new())),
                outcome,
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(false)
            }
        }

        /// Shared handle to the payloads seen so far
        pub fn seen(&self) -> Arc<Mutex<Vec<T>>> {
            Arc::clone(&self.seen)
        }

        pub fn call_count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl<T: Send + 'static> Processor<T> for RecordingProcessor<T> {
        async fn process(&self, data: T) -> Result<bool> {
            self.seen.lock().unwrap().push(data);
            if self.fail {
                return Err(AppError::Processing("processor rejected payload".to_string()));
            }
            Ok(self.outcome)
        }
    }
}
