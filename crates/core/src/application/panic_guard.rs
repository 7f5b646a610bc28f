// Panic isolation for background tasks
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

use crate::error::{AppError, Result};

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed successfully
    Success(T),
    /// Execution panicked
    Panicked(String),
}

impl<T> PanicGuardResult<Result<T>> {
    /// Collapse a guarded fallible call; a panic becomes a lifecycle error of `task`
    pub fn flatten(self, task: &str) -> Result<T> {
        match self {
            PanicGuardResult::Success(result) => result,
            PanicGuardResult::Panicked(msg) => {
                Err(AppError::lifecycle(task, format!("panicked: {msg}")))
            }
        }
    }
}

/// Execute a future with panic isolation
///
/// The panic is caught at the await point and logged; the caller keeps running.
///
/// # Example
/// ```text
/// let result = execute_guarded_async("unit-0", async {
///     panic!("test panic");
/// }).await;
/// assert!(matches!(result, PanicGuardResult::Panicked(_)));
/// ```
pub async fn execute_guarded_async<F, T>(task: &str, future: F) -> PanicGuardResult<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => PanicGuardResult::Success(result),
        Err(panic_info) => {
            let panic_msg = panic_message(panic_info.as_ref());
            error!(task = %task, panic_msg = %panic_msg, "Background task panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passes_through() {
        let result = execute_guarded_async("t", async { 42 }).await;
        assert!(matches!(result, PanicGuardResult::Success(42)));
    }

    #[tokio::test]
    async fn test_panic_is_caught_with_message() {
        let result = execute_guarded_async("t", async {
            if true {
                panic!("boom {}", 7);
            }
        })
        .await;
        match result {
            PanicGuardResult::Panicked(msg) => assert_eq!(msg, "boom 7"),
            PanicGuardResult::Success(_) => panic!("expected panic"),
        }
    }

    #[tokio::test]
    async fn test_flatten_maps_panic_to_lifecycle_error() {
        let result: PanicGuardResult<Result<()>> =
            PanicGuardResult::Panicked("static".to_string());
        let err = result.flatten("worker").unwrap_err();
        assert_eq!(err.as_label(), "lifecycle");
        assert!(err.to_string().contains("worker"));
    }
}
