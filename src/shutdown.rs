//! Graceful shutdown
//!
//! A stop request prevents new ticks from being scheduled. The tick in
//! progress always finishes, so every reservation reaches commit, cancel or
//! FAILED before the final snapshot is written.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Normal graceful shutdown (SIGTERM, SIGINT)
    Graceful,
    /// Operator asked for a fast stop; the current tick still completes
    Urgent,
    /// Fatal error inside the engine
    Fatal,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Urgent => write!(f, "urgent"),
            ShutdownSignal::Fatal => write!(f, "fatal"),
        }
    }
}

/// Shutdown phase tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    /// No new ticks; the tick in progress is finishing
    Draining,
    /// Writing the final snapshot
    Snapshotting,
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::Draining => write!(f, "draining"),
            ShutdownPhase::Snapshotting => write!(f, "snapshotting"),
            ShutdownPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Shutdown coordinator
pub struct GracefulShutdown {
    shutdown_requested: AtomicBool,
    signal_tx: watch::Sender<Option<ShutdownSignal>>,
    signal_rx: watch::Receiver<Option<ShutdownSignal>>,
    phase_tx: watch::Sender<ShutdownPhase>,
    phase_rx: watch::Receiver<ShutdownPhase>,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (signal_tx, signal_rx) = watch::channel(None);
        let (phase_tx, phase_rx) = watch::channel(ShutdownPhase::Running);
        Self {
            shutdown_requested: AtomicBool::new(false),
            signal_tx,
            signal_rx,
            phase_tx,
            phase_rx,
        }
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn current_phase(&self) -> ShutdownPhase {
        *self.phase_rx.borrow()
    }

    /// Request shutdown. Only the first request counts.
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        let _ = self.signal_tx.send(Some(signal));
    }

    pub fn set_phase(&self, phase: ShutdownPhase) {
        let _ = self.phase_tx.send(phase);
        info!("Shutdown phase: {}", phase);
    }

    /// Token for tasks that need to observe the request
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            signal_rx: self.signal_rx.clone(),
            phase_rx: self.phase_rx.clone(),
        }
    }
}

/// Cloneable view of the shutdown state. Sees requests made before it was created.
#[derive(Clone)]
pub struct ShutdownToken {
    signal_rx: watch::Receiver<Option<ShutdownSignal>>,
    phase_rx: watch::Receiver<ShutdownPhase>,
}

impl ShutdownToken {
    pub fn is_shutdown_requested(&self) -> bool {
        self.signal_rx.borrow().is_some()
    }

    /// Wait for shutdown signal
    pub async fn wait_for_shutdown(&mut self) -> ShutdownSignal {
        loop {
            if let Some(signal) = *self.signal_rx.borrow_and_update() {
                return signal;
            }
            if self.signal_rx.changed().await.is_err() {
                // Coordinator dropped
                return ShutdownSignal::Urgent;
            }
        }
    }

    pub fn current_phase(&self) -> ShutdownPhase {
        *self.phase_rx.borrow()
    }

    /// Wait for specific phase
    pub async fn wait_for_phase(&mut self, target: ShutdownPhase) {
        while *self.phase_rx.borrow() != target {
            if self.phase_rx.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Helper to install OS signal handlers
pub fn install_signal_handlers(shutdown: Arc<GracefulShutdown>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, name, shutdown_signal) in [
            (SignalKind::terminate(), "SIGTERM", ShutdownSignal::Graceful),
            (SignalKind::interrupt(), "SIGINT", ShutdownSignal::Graceful),
            (SignalKind::quit(), "SIGQUIT", ShutdownSignal::Urgent),
        ] {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                match signal(kind) {
                    Ok(mut stream) => {
                        stream.recv().await;
                        info!("Received {}", name);
                        shutdown.request_shutdown(shutdown_signal);
                    }
                    Err(e) => error!("Failed to install {} handler: {}", name, e),
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C");
                    shutdown.request_shutdown(ShutdownSignal::Graceful);
                }
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_signal_display() {
        assert_eq!(ShutdownSignal::Graceful.to_string(), "graceful");
        assert_eq!(ShutdownSignal::Fatal.to_string(), "fatal");
        assert_eq!(ShutdownPhase::Draining.to_string(), "draining");
    }

    #[tokio::test]
    async fn test_shutdown_request() {
        let shutdown = GracefulShutdown::new();
        assert!(!shutdown.is_shutdown_requested());
        assert_eq!(shutdown.current_phase(), ShutdownPhase::Running);

        shutdown.request_shutdown(ShutdownSignal::Graceful);
        assert!(shutdown.is_shutdown_requested());

        // Duplicate request is ignored
        shutdown.request_shutdown(ShutdownSignal::Urgent);
        let mut token = shutdown.token();
        assert_eq!(token.wait_for_shutdown().await, ShutdownSignal::Graceful);
    }

    #[tokio::test]
    async fn token_wakes_on_later_request() {
        let shutdown = Arc::new(GracefulShutdown::new());
        let mut token = shutdown.token();
        assert!(!token.is_shutdown_requested());

        let s = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            s.request_shutdown(ShutdownSignal::Urgent);
        });

        let signal = tokio::time::timeout(Duration::from_secs(1), token.wait_for_shutdown())
            .await
            .unwrap();
        assert_eq!(signal, ShutdownSignal::Urgent);
        assert!(token.is_shutdown_requested());
    }
}
