//! Unix domain socket dialer.

use crate::error::{Result, TransportError};
use crate::uri::EndpointUri;
use std::path::Path;
use std::time::Duration;
use tokio::net::UnixStream;

/// Default request retry budget for the pooled layer above.
///
/// Inherited policy: the pool this dialer feeds historically retried
/// requests up to ten times. Exposed as configuration rather than buried
/// as a constant; the dialer itself never retries.
pub const DEFAULT_RETRY_BUDGET: u32 = 10;

/// Dials Unix-socket endpoints.
///
/// Holds no per-connection state; each dial yields an independent
/// [`UnixStream`] whose socket closes with the owning connection. OS-level
/// connect errors propagate unchanged, so `NotFound`, `PermissionDenied`
/// and `ConnectionRefused` stay distinguishable for callers; none of them
/// is retried at this layer.
#[derive(Debug, Clone)]
pub struct UnixDialer {
    timeout: Option<Duration>,
    retry_budget: u32,
}

impl Default for UnixDialer {
    fn default() -> Self {
        Self::new()
    }
}

impl UnixDialer {
    /// Creates a dialer that blocks indefinitely on connect.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: None,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }

    /// Bounds each connect attempt. Absent timeout = block indefinitely,
    /// consistent with the pooled client's timeout model.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the retry budget surfaced to the pooled layer.
    #[must_use]
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Retry budget for the connection pool built on top of this dialer.
    #[must_use]
    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// Connects to the endpoint's socket path.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] for non-Unix endpoints, an
    /// `Io` error with kind `TimedOut` when the configured timeout elapses,
    /// and the OS connect error unchanged otherwise.
    pub async fn dial(&self, endpoint: &EndpointUri) -> Result<UnixStream> {
        let path = endpoint.socket_path().ok_or_else(|| TransportError::InvalidUri {
            uri: endpoint.to_string(),
            reason: "not a unix-socket endpoint".to_string(),
        })?;
        self.dial_path(path).await
    }

    /// Connects to a socket path directly (used by the ssh tunnel for its
    /// local forwarding socket).
    pub(crate) async fn dial_path(&self, path: &Path) -> Result<UnixStream> {
        tracing::debug!(path = %path.display(), "dialing unix socket");
        let stream = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, UnixStream::connect(path))
                .await
                .map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("connect to {} timed out", path.display()),
                    )
                })??,
            None => UnixStream::connect(path).await?,
        };
        Ok(stream)
    }
}
