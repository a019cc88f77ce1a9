pub mod config;
pub mod http;
pub mod logging;
pub mod mime;
pub mod server;
pub mod task_group;

/// Crate version, advertised in the startup banner and the `Server`
/// response header.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
