//! Server lifecycle.
//!
//! [`Server`] wires the configuration, the TLS acceptor and the task
//! group together, runs the accept loop under supervision, and owns the
//! two-phase stop protocol:
//!
//! 1. emit total cancellation and wait up to [`DRAIN_DEADLINE`] for every
//!    child to finish cooperatively;
//! 2. on expiry, emit terminal cancellation and wait unbounded; every
//!    in-flight operation aborts, so the drain completes promptly.
//!
//! [`Server::terminate`] is the last-resort path: it ends
//! [`Server::run`] immediately, bypassing the task group, and the binary
//! shuts the runtime down without draining.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::server::listener::accept_loop;
use crate::server::session::SessionContext;
use crate::server::signals;
use crate::server::tls::{self, TlsError};
use crate::task_group::{CancelLevel, TaskGroup};

/// Bounded cooperative drain before escalating to terminal cancellation.
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// How a server run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Every child task drained; the process can exit normally.
    Graceful,
    /// The scheduler must be stopped without draining.
    Terminated,
}

/// State shared between the server handle, the accept loop and the
/// signal watcher.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) ctx: SessionContext,
    pub(crate) group: TaskGroup,
    stopping: AtomicBool,
    stopped: CancellationToken,
    terminated: CancellationToken,
    accept_failure: Mutex<Option<io::Error>>,
    accept_failed: CancellationToken,
}

impl Shared {
    fn fail_accept(&self, e: io::Error) {
        *self.accept_failure.lock() = Some(e);
        self.accept_failed.cancel();
    }
}

/// The HTTP/HTTPS file server.
///
/// Cheap to clone; clones share one underlying server.
#[derive(Clone)]
pub struct Server {
    pub(crate) shared: Arc<Shared>,
}

impl Server {
    /// Constructs a server from configuration.
    ///
    /// TLS material is loaded here. A failure is fatal when
    /// `ssl.force_ssl` is set (the server could then serve nothing);
    /// otherwise HTTPS is disabled with a warning and cleartext serving
    /// continues.
    pub fn new(config: Config) -> Result<Server, TlsError> {
        let tls = match tls::build_acceptor(&config.ssl) {
            Ok(acceptor) => {
                info!("loaded SSL certificates");
                Some(acceptor)
            }
            Err(e) if config.ssl.force_ssl => return Err(e),
            Err(e) => {
                warn!("disabling HTTPS: {}", e);
                None
            }
        };

        let ctx = SessionContext {
            doc_root: config.http.doc_root.clone(),
            fallback_file: config.http.fallback_file.clone(),
            force_ssl: config.ssl.force_ssl,
            tls,
        };

        Ok(Server {
            shared: Arc::new(Shared {
                config,
                ctx,
                group: TaskGroup::new(),
                stopping: AtomicBool::new(false),
                stopped: CancellationToken::new(),
                terminated: CancellationToken::new(),
                accept_failure: Mutex::new(None),
                accept_failed: CancellationToken::new(),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Runs the server on an already-bound listener.
    ///
    /// Creates the document root, spawns the accept loop under task-group
    /// supervision and the signal watcher detached, then parks until a
    /// completed [`stop`](Server::stop), a [`terminate`](Server::terminate),
    /// or a fatal accept error.
    pub async fn run(&self, listener: TcpListener) -> Result<Shutdown, io::Error> {
        tokio::fs::create_dir_all(&self.shared.ctx.doc_root).await?;
        info!("listening on {}", listener.local_addr()?);

        let membership = self.shared.group.adapt();
        let token = membership.token();
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let _membership = membership;
            if let Err(e) = accept_loop(listener, Arc::clone(&shared), token).await {
                error!("accept loop failed: {}", e);
                shared.fail_accept(e);
            }
        });

        tokio::spawn(signals::watch(self.clone()));

        tokio::select! {
            _ = self.shared.stopped.cancelled() => {
                info!("server stopped");
                Ok(Shutdown::Graceful)
            }
            _ = self.shared.terminated.cancelled() => {
                info!("server terminated");
                Ok(Shutdown::Terminated)
            }
            _ = self.shared.accept_failed.cancelled() => {
                Err(self
                    .shared
                    .accept_failure
                    .lock()
                    .take()
                    .unwrap_or_else(|| io::Error::other("accept loop failed")))
            }
        }
    }

    /// Graceful two-phase stop.
    ///
    /// Returns once the task group is drained. A concurrent second call
    /// returns immediately without waiting.
    pub async fn stop(&self) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("stopping server");
        self.shared.group.emit(CancelLevel::Total);

        info!(
            "waiting {}s for child tasks to terminate",
            DRAIN_DEADLINE.as_secs()
        );
        if timeout(DRAIN_DEADLINE, self.shared.group.wait())
            .await
            .is_err()
        {
            error!("drain deadline expired, terminating child tasks");
            self.shared.group.emit(CancelLevel::Terminal);
            self.shared.group.wait().await;
        }

        self.shared.stopped.cancel();
    }

    /// Ends [`Server::run`] immediately, bypassing the task group.
    pub fn terminate(&self) {
        self.shared.terminated.cancel();
    }
}
