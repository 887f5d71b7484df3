//! Explicit shutdown of the connection engine.
//!
//! Shutdown is the only way out of the reconnect loop: once triggered, the
//! manager cancels whatever it is waiting on, fails outstanding requests,
//! closes the link and returns from [`ConnectionManager::run`].
//!
//! [`ConnectionManager::run`]: crate::ConnectionManager::run

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

/// Cloneable trigger shared between the host and the manager.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests shutdown. Idempotent.
    pub fn trigger(&self) {
        if !self.tx.send_replace(true) {
            info!("Shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Completes once shutdown has been triggered, immediately if it
    /// already was. Owns its receiver, so it can be moved into a task.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.wait_for(|triggered| *triggered).await;
        }
    }

    /// Borrowing form of [`wait`](Self::wait), for `select!` arms.
    pub async fn cancelled(&self) {
        self.wait().await;
    }

    /// Triggers shutdown on Ctrl+C.
    pub fn trigger_on_ctrl_c(&self) {
        let handle = self.clone();
        let stopped = self.wait();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        info!("Received Ctrl+C");
                        handle.trigger();
                    }
                }
                _ = stopped => {}
            }
            debug!("Ctrl+C listener stopped");
        });
    }
}
