// Task Factory Port (Interface)

use crate::port::runnable::TaskRef;

/// Produces the runnables a host should supervise
///
/// `None` means "nothing to contribute" and is skipped by the lifecycle manager.
pub trait TaskFactory<C>: Send + Sync {
    fn tasks(&self, context: Option<&C>) -> Option<Vec<TaskRef>>;
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Hands out the same task list on every call and counts invocations
    pub struct StaticTaskFactory {
        tasks: Option<Vec<TaskRef>>,
        calls: Arc<AtomicUsize>,
    }

    impl StaticTaskFactory {
        pub fn new(tasks: Vec<TaskRef>) -> Self {
            Self {
                tasks: Some(tasks),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn empty() -> Self {
            Self {
                tasks: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn calls(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }
    }

    impl<C> TaskFactory<C> for StaticTaskFactory {
        fn tasks(&self, _context: Option<&C>) -> Option<Vec<TaskRef>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tasks.clone()
        }
    }
}
