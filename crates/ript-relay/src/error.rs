//! Relay binary error types.

use std::fmt;

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur while starting or running the relay.
#[derive(Debug)]
pub enum RelayError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Relay core error (router, listeners, service).
    Server(ript_server::ServerError),
    /// Logging could not be initialized.
    Tracing(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Server(err) => write!(f, "relay error: {}", err),
            Self::Tracing(msg) => write!(f, "logging setup failed: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Server(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ript_server::ServerError> for RelayError {
    fn from(err: ript_server::ServerError) -> Self {
        Self::Server(err)
    }
}

impl From<ript_core::TracingError> for RelayError {
    fn from(err: ript_core::TracingError) -> Self {
        Self::Tracing(err.to_string())
    }
}
