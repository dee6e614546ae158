//! Error types for transport operations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while dialing or supervising connections.
///
/// Configuration errors (`UnsupportedScheme`, `InvalidUri`,
/// `IdentityFileNotFound`) are raised at parse/construction time, never
/// deferred to first use. OS-level connect errors are carried unchanged in
/// [`TransportError::Io`] so callers can still distinguish "no such file",
/// "connection refused" and "permission denied" by `io::ErrorKind`.
#[derive(Debug, Error)]
pub enum TransportError {
    /// URI scheme outside the supported set.
    #[error("unsupported scheme '{scheme}': expected one of {supported}")]
    UnsupportedScheme {
        /// The scheme that was requested.
        scheme: String,
        /// Comma-separated supported schemes.
        supported: &'static str,
    },

    /// URI could not be parsed or is missing a required component.
    #[error("invalid endpoint uri '{uri}': {reason}")]
    InvalidUri {
        /// The offending URI.
        uri: String,
        /// What was wrong with it.
        reason: String,
    },

    /// SSH identity file does not exist.
    #[error("identity file not found: {0}")]
    IdentityFileNotFound(PathBuf),

    /// The `ssh` client process could not be started.
    #[error("failed to spawn ssh client: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// Local forwarding socket never appeared within the deadline.
    #[error("timed out after {waited:?} waiting for ssh tunnel socket")]
    TunnelTimeout {
        /// How long the tunnel waited before giving up.
        waited: Duration,
    },

    /// Tunnel used after close, or connected twice. Tunnels are single-use.
    #[error("ssh tunnel is closed")]
    TunnelClosed,

    /// I/O error, propagated unchanged from the OS.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
