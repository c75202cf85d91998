use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Waits for ctrl-c, or SIGTERM on unix, and cancels `cancelation`. `habitrack stop` kills the
/// daemon, which on unix arrives as SIGTERM.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to listen for SIGTERM {e:?}");
                wait_ctrl_c(cancelation).await;
                return;
            }
        };
        select! {
            _ = tokio::signal::ctrl_c() => (),
            _ = terminate.recv() => (),
            _ = cancelation.cancelled() => return,
        };
        info!("Shutting down");
        cancelation.cancel();
    }
    #[cfg(not(unix))]
    wait_ctrl_c(cancelation).await;
}

async fn wait_ctrl_c(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
