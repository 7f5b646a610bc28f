// Task Domain Model (lifecycle state of a runnable)

use std::fmt;

/// Lifecycle state of a runnable
///
/// `NotStarted -> Running -> Stopped`; a stopped task may be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    #[default]
    NotStarted,
    Running,
    Stopped,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotStarted => "not_started",
            RunState::Running => "running",
            RunState::Stopped => "stopped",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initialization tasks run once before any persistent task is started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskKind {
    Initialization,
    #[default]
    Persistent,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Initialization => "initialization",
            TaskKind::Persistent => "persistent",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
