//! Ctrl-C handling.

use tokio_util::sync::CancellationToken;

/// Cancel `token` on the first Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                    return;
                }
                eprintln!("Shutting down...");
                token.cancel();
            }
        }
    });
}
