//! Shutdown Signal Handling
//!
//! Resolves once the process is asked to stop (SIGTERM, SIGINT or Ctrl+C).
//! Sessions are not drained; in-flight connections close with the process.

use tokio::signal;
use tracing::info;

use crate::Result;

/// Wait for the first shutdown signal.
pub async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}
