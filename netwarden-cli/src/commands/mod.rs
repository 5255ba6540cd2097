//! Command handlers -- one module per subcommand

pub mod capture;
pub mod config;
pub mod live;
pub mod siem;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// Cancel `token` on the first SIGINT or SIGTERM.
///
/// Handlers are installed before this returns, so a signal arriving right
/// after the call is not lost.
pub fn cancel_on_shutdown_signal(token: CancellationToken) -> Result<()> {
    let signals = ShutdownSignals::install()?;
    tokio::spawn(async move {
        tokio::select! {
            signal = signals.recv() => {
                tracing::info!(signal, "shutdown signal received");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });
    Ok(())
}

#[cfg(unix)]
struct ShutdownSignals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> &'static str {
        // no handler: the run ends with its input
        match tokio::signal::ctrl_c().await {
            Ok(()) => "CTRL_C",
            Err(_) => std::future::pending().await,
        }
    }
}
