use std::io;

/// Session error types.
#[derive(Debug)]
pub enum SessionError {
    /// The underlying transport failed mid-session.
    Io(io::Error),
    /// The session was cut short by terminal cancellation. A flow-control
    /// outcome of shutdown, not a fault: callers log it at debug level at
    /// most.
    Aborted,
}

impl SessionError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, SessionError::Aborted)
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Io(e) => write!(f, "I/O error: {}", e),
            SessionError::Aborted => write!(f, "session aborted"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        SessionError::Io(e)
    }
}
