use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Cancel `token` when SIGTERM or SIGINT arrives.
///
/// Workers never see the signal directly; they poll the token between
/// transitions, so an in-flight subprocess-bound transition completes before
/// a worker exits.
pub fn listen_for_shutdown(token: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }

        token.cancel();
    });
}
