//! OS signal handling.

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use crate::server::core::Server;

/// Watches the two canonical shutdown signals and maps them to the
/// server's stop paths: interrupt (SIGINT) drains gracefully, terminate
/// (SIGTERM) stops the scheduler without draining.
///
/// Runs as a detached task. It must not be part of the supervised drain
/// set: it is the task that triggers the drain.
pub(crate) async fn watch(server: Server) {
    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(signal) => signal,
        Err(e) => {
            error!("failed to install SIGINT handler: {}", e);
            return;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(e) => {
            error!("failed to install SIGTERM handler: {}", e);
            return;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => {
            info!("interrupt received");
            server.stop().await;
        }
        _ = terminate.recv() => {
            info!("terminate received");
            server.terminate();
        }
    }
}
