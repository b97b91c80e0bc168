//! Cooperative cancellation.
//!
//! The first Ctrl+C flips a watch channel that the crawl and author loops
//! observe between units; the run then stops and exports what it has.
//! A second Ctrl+C exits immediately.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

/// Clonable cancellation signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Request cancellation
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        // Sender lives in self, so wait_for only fails if it is dropped
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep for `duration` unless cancelled first. Returns false if cancelled.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_triggered();
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_triggered(),
            _ = self.triggered() => false,
        }
    }

    /// Run `fut` unless cancelled first
    pub async fn run_until<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            out = fut => Some(out),
            _ = self.triggered() => None,
        }
    }
}

/// Trigger `shutdown` on the first Ctrl+C; exit the process on the second.
pub fn setup_shutdown_handler(shutdown: Shutdown) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, finishing the current step and exporting");
            tracing::warn!("Press Ctrl+C again to force quit");
            shutdown.trigger();

            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::error!("Force quit requested, exiting immediately");
                std::process::exit(130);
            }
        }
    });
}
