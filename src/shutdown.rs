use std::sync::{Arc, OnceLock};

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Shutdown trigger shared by the node's subsystems.
///
/// Records the number of the first signal received so the process can exit
/// with it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    signal: Arc<OnceLock<i32>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the shutdown. Only the first signal number is kept.
    pub fn trigger(&self, signal: Option<i32>) {
        if let Some(signo) = signal {
            let _ = self.signal.set(signo);
        }
        self.token.cancel();
    }

    /// The received signal number, or 0 when shutdown was not caused by one.
    pub fn exit_code(&self) -> i32 {
        self.signal.get().copied().unwrap_or(0)
    }
}

/// Install handlers for SIGTERM, SIGINT, SIGHUP and SIGQUIT.
///
/// SIGKILL cannot be caught, so no handler exists for it; a killed node skips
/// deregistration and its registry entry expires with the lease.
pub fn install_shutdown_handler() -> std::io::Result<ShutdownSignal> {
    let shutdown = ShutdownSignal::new();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        let received = tokio::select! {
            _ = sigterm.recv() => Signal::SIGTERM,
            _ = sigint.recv() => Signal::SIGINT,
            _ = sighup.recv() => Signal::SIGHUP,
            _ = sigquit.recv() => Signal::SIGQUIT,
        };
        tracing::info!(signal = %received, "Received signal, initiating graceful shutdown");
        trigger.trigger(Some(received as i32));
    });

    Ok(shutdown)
}
