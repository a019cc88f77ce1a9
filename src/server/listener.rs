//! Accept loop.

use std::io;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error};

use crate::server::core::Shared;
use crate::server::session;
use crate::task_group::ChildToken;

/// Accepts connections until cancelled, spawning one supervised session
/// per socket.
///
/// Total cancellation aborts the pending `accept` and ends the loop
/// silently (the listener closes when this returns, so later connection
/// attempts are refused). Any other accept failure is fatal and
/// propagated to the server.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    token: ChildToken,
) -> io::Result<()> {
    while !token.is_cancelled() {
        let socket = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                debug!("accepted connection from {}", peer);
                socket
            }
        };

        // Register before spawning so a cancellation emitted right now
        // still reaches this session.
        let membership = shared.group.adapt();
        let child = membership.token();
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let _membership = membership;
            match session::serve(socket, &shared.ctx, child).await {
                Ok(()) => {}
                Err(e) if e.is_aborted() => debug!("session aborted during shutdown"),
                Err(e) => error!("session failed: {}", e),
            }
        });
    }
    Ok(())
}
