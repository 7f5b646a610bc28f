// Shutdown Token (cancellation for background loops)

use crate::error::{AppError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Shutdown signal for graceful termination
///
/// Dropping the paired `ShutdownSender` counts as a shutdown request, so a
/// loop never outlives the runnable that owns its sender.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait for shutdown signal
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Additional token observing this sender
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

/// A spawned loop paired with the sender that cancels it
pub struct BackgroundLoop {
    shutdown: ShutdownSender,
    handle: JoinHandle<()>,
}

impl BackgroundLoop {
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(ShutdownToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, token) = shutdown_channel();
        let handle = tokio::spawn(body(token));
        Self { shutdown, handle }
    }

    /// Signal the loop and wait for it to exit
    ///
    /// Returns false when `timeout` elapsed first; the loop is left to finish on its own.
    pub async fn stop(self, task: &str, timeout: Option<Duration>) -> Result<bool> {
        self.shutdown.shutdown();
        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        task = %task,
                        timeout_ms = limit.as_millis() as u64,
                        "Loop did not stop in time; in-flight work left to finish"
                    );
                    return Ok(false);
                }
            },
            None => self.handle.await,
        };
        joined
            .map(|_| true)
            .map_err(|join_err| AppError::lifecycle(task, join_err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_shutdown() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());

        let waiter = tokio::spawn(async move {
            token.wait().await;
            token.is_shutdown()
        });
        tx.shutdown();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_sender_counts_as_shutdown() {
        let (tx, mut token) = shutdown_channel();
        drop(tx);
        assert!(token.is_shutdown());
        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .expect("wait must return once the sender is gone");
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_loop_stop_and_timeout() {
        let quick = BackgroundLoop::spawn(|mut token| async move { token.wait().await });
        assert!(quick.stop("quick", Some(Duration::from_secs(1))).await.unwrap());

        let stubborn = BackgroundLoop::spawn(|_token| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        assert!(!stubborn.stop("stubborn", Some(Duration::from_secs(1))).await.unwrap());
    }

    #[tokio::test]
    async fn test_late_token_sees_earlier_shutdown() {
        let (tx, _token) = shutdown_channel();
        tx.shutdown();
        let mut late = tx.token();
        assert!(late.is_shutdown());
        late.wait().await;
    }
}
