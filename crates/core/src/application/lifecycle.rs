// Task Lifecycle Manager - loads, starts, stops and disposes every background task

use crate::application::constants::DEFAULT_START_STAGGER;
use crate::application::panic_guard::execute_guarded_async;
use crate::domain::TaskKind;
use crate::error::{AppError, Result};
use crate::port::{TaskFactory, TaskRef};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Outcome of [`TaskManager::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunReport {
    pub started: usize,
    pub attempted: usize,
}

#[derive(Default)]
struct Snapshots {
    initialization: Option<Arc<[TaskRef]>>,
    persistent: Option<Arc<[TaskRef]>>,
    // Stopped or superseded groups still awaiting dispose
    retired: Vec<Arc<[TaskRef]>>,
}

impl Snapshots {
    fn drain(&mut self) -> Vec<Arc<[TaskRef]>> {
        let mut groups = std::mem::take(&mut self.retired);
        groups.extend(self.initialization.take());
        groups.extend(self.persistent.take());
        groups.retain(|group| !group.is_empty());
        groups
    }
}

/// Host-facing supervisor of every runnable produced by the task factories
///
/// Factories are invoked at most once per load cycle; `stop` ends the cycle so
/// the next `load_and_prepare` rebuilds the roster from scratch. One task's
/// failure (error or panic) never prevents the others from starting, stopping
/// or disposing.
pub struct TaskManager<C> {
    factories: Vec<Arc<dyn TaskFactory<C>>>,
    stagger: Duration,
    snapshots: Mutex<Snapshots>,
}

impl<C> TaskManager<C> {
    pub fn new(factories: Vec<Arc<dyn TaskFactory<C>>>) -> Result<Self> {
        if factories.is_empty() {
            return Err(AppError::Config(
                "task manager requires at least one task factory".to_string(),
            ));
        }
        Ok(Self {
            factories,
            stagger: DEFAULT_START_STAGGER,
            snapshots: Mutex::new(Snapshots::default()),
        })
    }

    pub fn single(factory: Arc<dyn TaskFactory<C>>) -> Self {
        Self {
            factories: vec![factory],
            stagger: DEFAULT_START_STAGGER,
            snapshots: Mutex::new(Snapshots::default()),
        }
    }

    /// Delay inserted after each task start
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    pub fn initialization_tasks(&self) -> Arc<[TaskRef]> {
        self.lock()
            .initialization
            .clone()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    pub fn tasks(&self) -> Arc<[TaskRef]> {
        self.lock()
            .persistent
            .clone()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().persistent.is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Snapshots> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Invoke every factory (once per load cycle) and partition the result
    pub fn load_and_prepare(&self, context: Option<&C>) -> bool {
        let mut snapshots = self.lock();
        if snapshots.persistent.is_some() {
            return true;
        }

        let (initialization, persistent): (Vec<TaskRef>, Vec<TaskRef>) = self
            .factories
            .iter()
            .filter_map(|factory| factory.tasks(context))
            .flatten()
            .partition(|task| task.kind() == TaskKind::Initialization);

        if initialization.is_empty() && persistent.is_empty() {
            warn!("No tasks loaded");
        } else {
            info!(
                initialization = initialization.len(),
                persistent = persistent.len(),
                "Tasks loaded"
            );
        }

        if let Some(previous) = snapshots.initialization.take() {
            snapshots.retired.push(previous);
        }
        snapshots.initialization = Some(Arc::from(initialization));
        snapshots.persistent = Some(Arc::from(persistent));
        true
    }

    /// Start initialization tasks, then persistent tasks, one at a time
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::default();
        self.start_all(&mut report).await;
        report
    }

    async fn start_all(&self, report: &mut RunReport) {
        let (initialization, persistent) = {
            let snapshots = self.lock();
            (snapshots.initialization.clone(), snapshots.persistent.clone())
        };
        // Stopped or never loaded
        let Some(persistent) = persistent else {
            warn!("No tasks to start");
            return;
        };

        let ordered: Vec<TaskRef> = initialization
            .iter()
            .chain(std::iter::once(&persistent))
            .flat_map(|tasks| tasks.iter().cloned())
            .collect();

        report.attempted = ordered.len();
        for task in ordered {
            let outcome = execute_guarded_async(task.name(), task.start())
                .await
                .flatten(task.name());
            match outcome {
                Ok(()) => {
                    report.started += 1;
                    info!(task = %task.name(), kind = %task.kind(), "Task started");
                }
                Err(e) => {
                    error!(task = %task.name(), error = %e, "Task failed to start");
                }
            }
            if !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }
        }

        info!(
            started = report.started,
            attempted = report.attempted,
            "Finished starting tasks {}/{}",
            report.started,
            report.attempted
        );
    }

    /// Stop every persistent task concurrently; returns how many stopped cleanly
    pub async fn stop(&self) -> usize {
        let (persistent, superseded) = {
            let mut snapshots = self.lock();
            let Some(persistent) = snapshots.persistent.take() else {
                return 0;
            };
            let superseded = std::mem::replace(&mut snapshots.retired, vec![Arc::clone(&persistent)]);
            (persistent, superseded)
        };

        let mut stops = JoinSet::new();
        for task in persistent.iter().cloned() {
            stops.spawn(async move {
                let name = task.name().to_string();
                let outcome = execute_guarded_async(&name, task.stop()).await.flatten(&name);
                (name, outcome)
            });
        }

        let mut stopped = 0;
        while let Some(joined) = stops.join_next().await {
            match joined {
                Ok((_, Ok(true))) => stopped += 1,
                Ok((name, Ok(false))) => warn!(task = %name, "Task did not stop in time"),
                Ok((name, Err(e))) => error!(task = %name, error = %e, "Task failed to stop"),
                Err(join_err) => error!(error = %join_err, "Stop worker aborted"),
            }
        }

        info!(stopped = stopped, total = persistent.len(), "Tasks stopped");

        // Groups from earlier cycles were stopped then; release them now
        dispose_all(superseded).await;
        stopped
    }

    /// Dispose every loaded task concurrently; safe to call more than once
    pub async fn dispose(&self) {
        let groups = self.lock().drain();
        dispose_all(groups).await;
    }

    /// Scoped host run: load, start, wait for `shutdown`, then stop and dispose
    ///
    /// `shutdown` is watched from the first task start on; resolving it during
    /// the staggered startup abandons the remaining starts.
    pub async fn serve<F>(&self, context: Option<&C>, shutdown: F) -> RunReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.load_and_prepare(context);

        let mut report = RunReport::default();
        let interrupted = tokio::select! {
            _ = self.start_all(&mut report) => false,
            _ = &mut shutdown => true,
        };
        if interrupted {
            warn!(
                started = report.started,
                attempted = report.attempted,
                "Shutdown requested during startup"
            );
        } else {
            shutdown.await;
        }

        info!("Shutdown requested; stopping tasks");
        self.stop().await;
        self.dispose().await;
        report
    }
}

async fn dispose_all(groups: Vec<Arc<[TaskRef]>>) {
    let mut disposals = JoinSet::new();
    for task in groups.iter().flat_map(|group| group.iter().cloned()) {
        disposals.spawn(async move {
            let name = task.name().to_string();
            let outcome = execute_guarded_async(&name, task.dispose()).await.flatten(&name);
            (name, outcome)
        });
    }
    while let Some(joined) = disposals.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((name, Err(e))) => error!(task = %name, error = %e, "Task failed to dispose"),
            Err(join_err) => error!(error = %join_err, "Dispose worker aborted"),
        }
    }
}

impl<C> Drop for TaskManager<C> {
    fn drop(&mut self) {
        let groups = self
            .snapshots
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain();
        if groups.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Task manager dropped with loaded tasks; disposing in background");
                handle.spawn(dispose_all(groups));
            }
            Err(_) => {
                warn!("Task manager dropped outside a runtime; loaded tasks were not disposed");
            }
        }
    }
}
