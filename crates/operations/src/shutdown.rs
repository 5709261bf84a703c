//! Coordinated graceful shutdown for the daemon.
//!
//! One coordinator owns the shutdown signal for the whole process. SIGTERM
//! or SIGINT flips a watch channel that the HTTP server, the dispatcher and
//! the cleanup job subscribe to. The daemon then drains in two bounded
//! steps: in-flight HTTP requests get a 5s window, after which the
//! dispatcher gets time to deliver its final batch. Bundles still pooled
//! when the budgets run out are lost, as the in-memory design intends.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Drain window for in-flight HTTP requests.
pub const HTTP_DRAIN_BUDGET: Duration = Duration::from_secs(5);

/// Drain window for the dispatcher's final batch.
pub const DISPATCHER_DRAIN_BUDGET: Duration = Duration::from_secs(10);

/// Owns the process-wide shutdown signal and the component drain sequence.
pub struct ShutdownCoordinator {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// A receiver components select on to begin their own shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Spawn the background task that flips the signal on SIGTERM/SIGINT.
    pub fn listen_for_signals(&self) {
        let tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            let signal = wait_for_termination().await;
            tracing::info!(signal, "received shutdown signal, draining");
            let _ = tx.send(true);
        });
    }

    /// Request shutdown programmatically (tests, fatal paths).
    pub fn trigger(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Resolve once shutdown has been requested, including when it already
    /// was before the call.
    pub async fn triggered(&self) {
        let mut rx = self.shutdown_rx.clone();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Run the drain sequence: HTTP connections first, then the dispatcher's
    /// final tick, each under its own budget.
    ///
    /// A component that overruns its budget is abandoned with an error log;
    /// the daemon exits regardless.
    pub async fn drain(
        &self,
        mut http_server: JoinHandle<std::io::Result<()>>,
        mut dispatcher: JoinHandle<()>,
    ) {
        match tokio::time::timeout(HTTP_DRAIN_BUDGET, &mut http_server).await {
            Ok(Ok(Ok(()))) => tracing::debug!("HTTP server drained"),
            Ok(Ok(Err(err))) => tracing::error!(error = %err, "HTTP server error during drain"),
            Ok(Err(err)) => tracing::error!(error = %err, "HTTP server task failed during drain"),
            Err(_) => tracing::error!(
                budget = ?HTTP_DRAIN_BUDGET,
                "HTTP server did not drain within budget"
            ),
        }

        match tokio::time::timeout(DISPATCHER_DRAIN_BUDGET, &mut dispatcher).await {
            Ok(Ok(())) => tracing::debug!("dispatcher sent its final batch"),
            Ok(Err(err)) => tracing::error!(error = %err, "dispatcher task failed during drain"),
            Err(_) => tracing::error!(
                budget = ?DISPATCHER_DRAIN_BUDGET,
                "dispatcher did not finish its final batch within budget"
            ),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    // Registration only fails without a reactor; the daemon always runs one.
    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> &'static str {
    tokio::signal::ctrl_c().await.expect("Ctrl+C handler");
    "Ctrl+C"
}
