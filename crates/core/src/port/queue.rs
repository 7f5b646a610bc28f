// Queue Transport Ports (Interface)

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// One leased message; lives for a single consume cycle
#[async_trait]
pub trait Queued<T>: Send + Sync {
    /// Fetch the payload; `None` marks a poison message
    async fn data(&self) -> Result<Option<T>>;

    /// Acknowledge (remove) the message from its queue
    async fn delete(&self) -> Result<()>;
}

/// Source of leased messages
#[async_trait]
pub trait Poller<T>: Send + Sync {
    /// Lease the next visible message, if any
    async fn poll(&self) -> Result<Option<Box<dyn Queued<T>>>>;
}

/// Approximate depth probe used for scale decisions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueCount: Send + Sync {
    async fn approximate_count(&self) -> Result<u64>;
}

/// Storage initialization (idempotent)
#[async_trait]
pub trait QueueInit: Send + Sync {
    /// Returns true when the queue was created by this call
    async fn ensure_exists(&self) -> Result<bool>;
}

/// Producer side of a queue
#[async_trait]
pub trait QueueWriter<T>: Send + Sync {
    async fn send(&self, message: &T) -> Result<()>;
}

/// Opens every queue capability for a `(connection, name)` pair
///
/// Opening is cheap and must not perform I/O; connections are established lazily.
pub trait QueueTransport<T>: Send + Sync {
    fn poller(&self, connection: &str, name: &str) -> Result<Arc<dyn Poller<T>>>;

    fn counter(&self, connection: &str, name: &str) -> Result<Arc<dyn QueueCount>>;

    fn initializer(&self, connection: &str, name: &str) -> Result<Arc<dyn QueueInit>>;

    fn writer(&self, connection: &str, name: &str) -> Result<Arc<dyn QueueWriter<T>>>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;

    struct State<T> {
        ready: VecDeque<(u64, Option<T>)>,
        leased: HashMap<u64, Option<T>>,
        deleted: Vec<u64>,
        next_id: u64,
        polls: usize,
        created: bool,
        fail_poll: bool,
        fail_data: bool,
        fail_count: bool,
    }

    /// In-memory queue with lease semantics
    ///
    /// Clones share state. `None` entries are poison messages.
    pub struct InMemoryQueue<T> {
        state: Arc<Mutex<State<T>>>,
    }

    impl<T> Clone for InMemoryQueue<T> {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
            }
        }
    }

    impl<T> Default for InMemoryQueue<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T> InMemoryQueue<T> {
        pub fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(State {
                    ready: VecDeque::new(),
                    leased: HashMap::new(),
                    deleted: Vec::new(),
                    next_id: 0,
                    polls: 0,
                    created: false,
                    fail_poll: false,
                    fail_data: false,
                    fail_count: false,
                })),
            }
        }

        pub fn push(&self, message: T) {
            self.push_entry(Some(message));
        }

        pub fn push_poison(&self) {
            self.push_entry(None);
        }

        fn push_entry(&self, entry: Option<T>) {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            state.ready.push_back((id, entry));
        }

        pub fn fail_polls(&self, fail: bool) {
            self.state.lock().unwrap().fail_poll = fail;
        }

        pub fn fail_data(&self, fail: bool) {
            self.state.lock().unwrap().fail_data = fail;
        }

        pub fn fail_counts(&self, fail: bool) {
            self.state.lock().unwrap().fail_count = fail;
        }

        /// Simulate lease expiry: every undeleted leased message becomes visible again
        pub fn expire_leases(&self) {
            let mut state = self.state.lock().unwrap();
            let mut expired: Vec<_> = state.leased.drain().collect();
            expired.sort_by_key(|(id, _)| *id);
            for entry in expired.into_iter().rev() {
                state.ready.push_front(entry);
            }
        }

        pub fn ready_len(&self) -> usize {
            self.state.lock().unwrap().ready.len()
        }

        pub fn leased_len(&self) -> usize {
            self.state.lock().unwrap().leased.len()
        }

        pub fn deleted_count(&self) -> usize {
            self.state.lock().unwrap().deleted.len()
        }

        pub fn poll_count(&self) -> usize {
            self.state.lock().unwrap().polls
        }

        pub fn is_created(&self) -> bool {
            self.state.lock().unwrap().created
        }
    }

    struct InMemoryItem<T> {
        id: u64,
        payload: Option<T>,
        state: Arc<Mutex<State<T>>>,
    }

    #[async_trait]
    impl<T: Clone + Send + Sync + 'static> Queued<T> for InMemoryItem<T> {
        async fn data(&self) -> Result<Option<T>> {
            if self.state.lock().unwrap().fail_data {
                return Err(AppError::Transport("payload fetch failed".to_string()));
            }
            Ok(self.payload.clone())
        }

        async fn delete(&self) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.leased.remove(&self.id).is_some() {
                state.deleted.push(self.id);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl<T: Clone + Send + Sync + 'static> Poller<T> for InMemoryQueue<T> {
        async fn poll(&self) -> Result<Option<Box<dyn Queued<T>>>> {
            let mut state = self.state.lock().unwrap();
            state.polls += 1;
            if state.fail_poll {
                return Err(AppError::Transport("poll failed".to_string()));
            }
            let Some((id, payload)) = state.ready.pop_front() else {
                return Ok(None);
            };
            state.leased.insert(id, payload.clone());
            Ok(Some(Box::new(InMemoryItem {
                id,
                payload,
                state: Arc::clone(&self.state),
            })))
        }
    }

    #[async_trait]
    impl<T: Send + Sync + 'static> QueueCount for InMemoryQueue<T> {
        async fn approximate_count(&self) -> Result<u64> {
            let state = self.state.lock().unwrap();
            if state.fail_count {
                return Err(AppError::Transport("count failed".to_string()));
            }
            Ok((state.ready.len() + state.leased.len()) as u64)
        }
    }

    #[async_trait]
    impl<T: Send + Sync + 'static> QueueInit for InMemoryQueue<T> {
        async fn ensure_exists(&self) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            let created = !state.created;
            state.created = true;
            Ok(created)
        }
    }

    #[async_trait]
    impl<T: Clone + Send + Sync + 'static> QueueWriter<T> for InMemoryQueue<T> {
        async fn send(&self, message: &T) -> Result<()> {
            self.push(message.clone());
            Ok(())
        }
    }

    /// Transport handing out in-memory queues keyed by name
    pub struct InMemoryTransport<T> {
        queues: Mutex<HashMap<String, InMemoryQueue<T>>>,
        connections: Mutex<HashSet<String>>,
    }

    impl<T> Default for InMemoryTransport<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T> InMemoryTransport<T> {
        pub fn new() -> Self {
            Self {
                queues: Mutex::new(HashMap::new()),
                connections: Mutex::new(HashSet::new()),
            }
        }

        /// Queue by name, created on first use
        pub fn queue(&self, name: &str) -> InMemoryQueue<T> {
            self.queues
                .lock()
                .unwrap()
                .entry(name.to_string())
                .or_default()
                .clone()
        }

        pub fn queue_names(&self) -> Vec<String> {
            let mut names: Vec<_> = self.queues.lock().unwrap().keys().cloned().collect();
            names.sort();
            names
        }

        pub fn used_connection(&self, connection: &str) -> bool {
            self.connections.lock().unwrap().contains(connection)
        }

        fn open(&self, connection: &str, name: &str) -> InMemoryQueue<T> {
            self.connections
                .lock()
                .unwrap()
                .insert(connection.to_string());
            self.queue(name)
        }
    }

    impl<T: Clone + Send + Sync + 'static> QueueTransport<T> for InMemoryTransport<T> {
        fn poller(&self, connection: &str, name: &str) -> Result<Arc<dyn Poller<T>>> {
            Ok(Arc::new(self.open(connection, name)))
        }

        fn counter(&self, connection: &str, name: &str) -> Result<Arc<dyn QueueCount>> {
            Ok(Arc::new(self.open(connection, name)))
        }

        fn initializer(&self, connection: &str, name: &str) -> Result<Arc<dyn QueueInit>> {
            Ok(Arc::new(self.open(connection, name)))
        }

        fn writer(&self, connection: &str, name: &str) -> Result<Arc<dyn QueueWriter<T>>> {
            Ok(Arc::new(self.open(connection, name)))
        }
    }
}
