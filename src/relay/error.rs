//! Relay error taxonomy

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the listener and by individual sessions.
///
/// Only [`RelayError::Bind`] is fatal. Everything else is scoped to one
/// accept call or one session.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("failed to connect to upstream {upstream}: {source}")]
    Dial {
        upstream: String,
        #[source]
        source: io::Error,
    },

    #[error("connecting to upstream {upstream} timed out after {timeout:?}")]
    DialTimeout { upstream: String, timeout: Duration },

    #[error("failed to prepare session socket: {0}")]
    Socket(#[source] io::Error),
}

impl RelayError {
    /// Whether the error ends the whole process rather than one session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Bind { .. })
    }
}
