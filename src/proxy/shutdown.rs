use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::signal;
use tokio::sync::Notify;

/// Shutdown flag plus the count of open client connections.
///
/// Shared by both listeners: one signal stops the data plane and the
/// management port together.
pub struct ShutdownManager {
    shutdown: AtomicBool,
    active_connections: AtomicUsize,
    notify: Notify,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            active_connections: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    /// Resolve once `signal_shutdown` has been called, even if that happened
    /// before this future was first polled.
    pub async fn shutdown_requested(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_shutting_down() {
                return;
            }
            notified.await;
        }
    }

    /// Wait for ctrl-c, SIGTERM or an explicit `signal_shutdown`, then flag
    /// shutdown for everyone.
    pub async fn listen_for_signals(&self) {
        #[cfg(unix)]
        {
            let mut sigterm =
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => Some(sigterm),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                        None
                    }
                };
            let sigterm_recv = async {
                match sigterm.as_mut() {
                    Some(sigterm) => {
                        sigterm.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = signal::ctrl_c() => tracing::info!("Received ctrl-c"),
                _ = sigterm_recv => tracing::info!("Received SIGTERM"),
                _ = self.shutdown_requested() => {},
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = signal::ctrl_c() => tracing::info!("Received ctrl-c"),
                _ = self.shutdown_requested() => {},
            }
        }

        self.signal_shutdown();
    }

    pub fn signal_shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            tracing::info!("Shutting down gracefully...");
        }
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// Poll until no connection is open or `timeout` elapses.
    ///
    /// Returns `true` when every connection drained in time.
    pub async fn wait_for_connections(&self, timeout: Duration) -> bool {
        tracing::info!(
            active = self.active_connections(),
            "Waiting for active connections..."
        );

        let start = tokio::time::Instant::now();

        while start.elapsed() < timeout {
            if self.active_connections() == 0 {
                tracing::info!("Server stopped");
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tracing::warn!(
            remaining = self.active_connections(),
            "Forced shutdown after timeout"
        );
        false
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
