use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{signal, sync::broadcast};

/// Why the gateway is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Triggered from code, e.g. a fatal background error
    Requested,
}

/// Fans a single stop signal out to the server and background tasks.
///
/// Once shutdown starts the listener stops accepting, in-flight requests get
/// `drain_timeout` to finish and background sweeps exit.
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    shutdown_initiated: Arc<AtomicBool>,
    drain_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(drain_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            shutdown_tx,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            drain_timeout,
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    /// Start shutdown. Only the first call has an effect.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::info!(reason = ?reason, "Shutdown initiated");
            // No receivers just means nothing is waiting yet; the flag covers it.
            let _ = self.shutdown_tx.send(reason);
        } else {
            tracing::debug!(reason = ?reason, "Shutdown already initiated, ignoring");
        }
    }

    /// Wait for SIGINT or SIGTERM and trigger shutdown.
    pub async fn run_signal_handler(&self) {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");

        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                self.trigger_shutdown(ShutdownReason::Interrupt);
            }
            _ = wait_for_sigterm() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                self.trigger_shutdown(ShutdownReason::Terminate);
            }
        }
    }

    /// A handle that resolves once shutdown starts.
    pub fn shutdown_token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.shutdown_tx.subscribe(),
            shutdown_initiated: self.shutdown_initiated.clone(),
        }
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::error!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}

/// Subscriber side of [`GracefulShutdown`].
pub struct ShutdownToken {
    receiver: broadcast::Receiver<ShutdownReason>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl Clone for ShutdownToken {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.resubscribe(),
            shutdown_initiated: self.shutdown_initiated.clone(),
        }
    }
}

impl ShutdownToken {
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    /// Resolve once shutdown has started, including when it started before
    /// this call.
    pub async fn wait(mut self) {
        if self.is_shutdown_initiated() {
            return;
        }
        // A closed or lagged channel also means the owner is gone or has fired.
        let _ = self.receiver.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_graceful_shutdown_creation() {
        let shutdown = GracefulShutdown::new(Duration::from_secs(5));
        assert!(!shutdown.is_shutdown_initiated());
        assert_eq!(shutdown.drain_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_trigger_wakes_subscribed_token() {
        let shutdown = GracefulShutdown::new(Duration::from_secs(5));
        let token = shutdown.shutdown_token();

        let waiter = tokio::spawn(token.wait());
        shutdown.trigger_shutdown(ShutdownReason::Requested);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("token should resolve")
            .unwrap();
        assert!(shutdown.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_token_created_after_trigger_resolves_immediately() {
        let shutdown = GracefulShutdown::new(Duration::from_secs(5));
        shutdown.trigger_shutdown(ShutdownReason::Terminate);

        let token = shutdown.shutdown_token();
        assert!(token.is_shutdown_initiated());
        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .expect("token should resolve");
    }

    #[tokio::test]
    async fn test_second_trigger_is_ignored() {
        let shutdown = GracefulShutdown::new(Duration::from_secs(5));
        let mut receiver = shutdown.shutdown_tx.subscribe();

        shutdown.trigger_shutdown(ShutdownReason::Interrupt);
        shutdown.trigger_shutdown(ShutdownReason::Terminate);

        assert_eq!(receiver.try_recv().unwrap(), ShutdownReason::Interrupt);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cloned_tokens_all_resolve() {
        let shutdown = GracefulShutdown::new(Duration::from_secs(5));
        let first = shutdown.shutdown_token();
        let second = first.clone();

        shutdown.trigger_shutdown(ShutdownReason::Requested);

        tokio::time::timeout(Duration::from_secs(1), async {
            first.wait().await;
            second.wait().await;
        })
        .await
        .expect("both tokens should resolve");
    }
}
