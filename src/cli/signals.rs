//! Signal handling for graceful shutdown

use crate::cancel::CancellationToken;

/// Fire `token` so in-flight work stops at its next cancellation point
pub fn request_shutdown(token: &CancellationToken) {
    tracing::debug!("Shutdown requested");
    token.cancel();
}

/// Wait for SIGINT/SIGTERM (Ctrl-C elsewhere), then cancel `token`
///
/// If no handler can be installed the task logs and returns without ever
/// cancelling.
pub async fn setup_signal_handlers(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(error = %e, "Failed to install signal handlers");
                    return;
                }
            };

        tokio::select! {
            _ = sigint.recv() => {
                eprintln!("\nReceived SIGINT, cancelling...");
            }
            _ = sigterm.recv() => {
                eprintln!("\nReceived SIGTERM, cancelling...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }
        eprintln!("\nReceived Ctrl+C, cancelling...");
    }

    request_shutdown(&token);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shutdown_fires_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        let observer = token.clone();
        request_shutdown(&token);

        assert!(observer.is_cancelled());
    }
}
