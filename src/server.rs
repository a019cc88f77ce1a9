//! Network front end for the file server.
//!
//! This module accepts client connections on one port and serves them
//! over HTTP or HTTPS, decided per connection by sniffing the opening
//! bytes.
//!
//! ## Architecture
//!
//! ```text
//! +--------+
//! | Server |  <- lifecycle: wiring, worker pool, two-phase stop
//! +--------+
//!      |
//!      v
//! +----------+     +-----------+
//! | Acceptor | --> | TaskGroup |  <- supervises every session
//! +----------+     +-----------+
//!      |
//!      v
//! +---------+     +--------+
//! | Session | --> | Detect |  <- TLS ClientHello vs cleartext
//! +---------+     +--------+
//!      |
//!      v
//! +---------+
//! | Handler |  <- GET/HEAD static file responses
//! +---------+
//! ```
//!
//! ## Terminology
//!
//! - **Server**: owns the task group and orchestrates startup/shutdown
//! - **Acceptor**: accept loop spawning one supervised session per socket
//! - **Session**: detection, optional TLS handshake, keep-alive HTTP loop
//! - **Handler**: maps a request to a static-file response

pub mod core;
pub mod detect;
pub mod handler;
pub mod listener;
pub mod session;
pub mod signals;
pub mod tls;

pub use self::core::{Server, Shutdown};
pub use session::SessionError;
pub use tls::TlsError;
