//! SSH tunnel transport.
//!
//! Makes a remote Unix socket, reachable only via ssh, look like an
//! ordinary local stream socket: an external `ssh` client is spawned with a
//! `-L <local>:<remote>` forward, the tunnel waits for the local forwarding
//! socket to appear, and the data path is then a plain Unix-socket
//! connection to that local path. The pipes to the child exist only to
//! supervise and terminate it; they are never the data path.
//!
//! Tunnels are single-use: once closed (or failed) a fresh instance is
//! constructed for the next connection attempt, and the child process and
//! local socket are torn down together.

use crate::error::{Result, TransportError};
use crate::pool::PoolKey;
use crate::unix::UnixDialer;
use crate::uri::EndpointUri;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};

/// How often the tunnel checks for the local forwarding socket.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long the tunnel waits for the forward to establish.
pub const DEFAULT_CONNECT_DEADLINE: Duration = Duration::from_secs(300);

/// How long a closing tunnel waits for the child after SIGTERM.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(20);

/// Tunnel configuration.
///
/// The runtime directory is injected here rather than resolved from the
/// environment inside the tunnel; see [`crate::runtime::runtime_dir`] for
/// the resolution the composition boundary performs once.
#[derive(Debug, Clone)]
pub struct SshTunnelConfig {
    /// Directory holding local forwarding sockets.
    pub runtime_dir: PathBuf,
    /// The ssh client executable, located via `PATH` by default.
    pub ssh_program: PathBuf,
    /// Poll interval while awaiting the local socket.
    pub poll_interval: Duration,
    /// Overall deadline for the forward to establish.
    pub connect_deadline: Duration,
    /// Grace period between SIGTERM and SIGKILL on close.
    pub shutdown_grace: Duration,
}

impl SshTunnelConfig {
    /// Creates a config with default timings for the given runtime dir.
    #[must_use]
    pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            ssh_program: PathBuf::from("ssh"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_deadline: DEFAULT_CONNECT_DEADLINE,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TunnelState {
    Unconnected,
    Connected,
    Closed,
}

/// A supervised `ssh` child forwarding a local socket to a remote one.
///
/// Owns the child process and the local forwarding socket path; nothing
/// else may write to that path or signal that process.
#[derive(Debug)]
pub struct SshTunnel {
    config: SshTunnelConfig,
    destination: String,
    remote_path: PathBuf,
    identity: Option<PathBuf>,
    local_path: PathBuf,
    child: Option<Child>,
    state: TunnelState,
}

impl SshTunnel {
    /// Prepares a tunnel for an ssh endpoint.
    ///
    /// The local forwarding socket gets a randomized per-instance name
    /// under the configured runtime directory. `identity` overrides any
    /// `identity` query parameter in the endpoint URI.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] when the endpoint is not an
    /// ssh endpoint.
    pub fn new(
        endpoint: &EndpointUri,
        identity: Option<&Path>,
        config: SshTunnelConfig,
    ) -> Result<Self> {
        let target = endpoint
            .ssh_target()
            .ok_or_else(|| TransportError::InvalidUri {
                uri: endpoint.to_string(),
                reason: "not an ssh endpoint".to_string(),
            })?;

        let identity = identity
            .map(Path::to_path_buf)
            .or_else(|| target.identity.clone());
        let local_path = config
            .runtime_dir
            .join(format!("podlink-ssh-{}.sock", uuid::Uuid::new_v4()));

        Ok(Self {
            config,
            destination: target.destination(),
            remote_path: target.remote_path.clone(),
            identity,
            local_path,
            child: None,
            state: TunnelState::Unconnected,
        })
    }

    /// Path of the local forwarding socket this tunnel owns.
    #[must_use]
    pub fn local_socket_path(&self) -> &Path {
        &self.local_path
    }

    /// Establishes the tunnel and returns the live data channel.
    ///
    /// Spawns the ssh client with a `-L` forward, polls for the local
    /// forwarding socket until it appears or the deadline elapses, then
    /// connects to it. On deadline expiry the child is terminated before
    /// the timeout error is returned, so a failed attempt never leaks a
    /// process.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::TunnelClosed`] on reuse,
    /// [`TransportError::SpawnFailed`] when the ssh client cannot start,
    /// and [`TransportError::TunnelTimeout`] when the forward never
    /// establishes.
    pub async fn connect(&mut self) -> Result<UnixStream> {
        if self.state != TunnelState::Unconnected {
            return Err(TransportError::TunnelClosed);
        }

        let mut command = Command::new(&self.config.ssh_program);
        command
            .arg("-N")
            .arg("-o")
            .arg("StrictHostKeyChecking=no");
        if let Some(identity) = &self.identity {
            command.arg("-i").arg(identity);
        }
        command
            .arg("-L")
            .arg(format!(
                "{}:{}",
                self.local_path.display(),
                self.remote_path.display()
            ))
            .arg(&self.destination)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(TransportError::SpawnFailed)?;
        tracing::debug!(
            destination = %self.destination,
            local = %self.local_path.display(),
            pid = child.id(),
            "spawned ssh forward"
        );
        self.child = Some(child);

        let started = Instant::now();
        while !self.local_path.exists() {
            if let Some(child) = self.child.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    self.teardown_now().await;
                    return Err(TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionAborted,
                        format!("ssh client exited before forward established: {status}"),
                    )));
                }
            }
            if started.elapsed() >= self.config.connect_deadline {
                tracing::warn!(
                    destination = %self.destination,
                    waited = ?self.config.connect_deadline,
                    "ssh forward never established, terminating client"
                );
                self.teardown_now().await;
                return Err(TransportError::TunnelTimeout {
                    waited: self.config.connect_deadline,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        match UnixDialer::new().dial_path(&self.local_path).await {
            Ok(stream) => {
                self.state = TunnelState::Connected;
                Ok(stream)
            }
            Err(e) => {
                self.teardown_now().await;
                Err(e)
            }
        }
    }

    /// Gracefully closes the tunnel.
    ///
    /// Closes the pipes (tolerating a broken pipe if the child already
    /// exited), sends SIGTERM, waits up to the grace period, SIGKILLs a
    /// lingering child, and deletes the local forwarding socket. Closing an
    /// already-closed tunnel is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == TunnelState::Closed {
            return Ok(());
        }
        self.state = TunnelState::Closed;

        if let Some(mut child) = self.child.take() {
            if let Some(mut stdin) = child.stdin.take() {
                // The child may already be gone; a broken pipe here is fine.
                let _ = stdin.shutdown().await;
            }
            drop(child.stdout.take());

            match child.id() {
                Some(pid) => {
                    if let Err(e) = send_sigterm(pid as i32) {
                        tracing::debug!(pid, error = %e, "SIGTERM failed, child likely exited");
                    }
                    match tokio::time::timeout(self.config.shutdown_grace, child.wait()).await {
                        Ok(_) => {}
                        Err(_) => {
                            tracing::warn!(pid, "ssh client ignored SIGTERM, killing");
                            let _ = child.kill().await;
                        }
                    }
                }
                None => {
                    let _ = child.wait().await;
                }
            }
        }

        remove_socket_file(&self.local_path);
        Ok(())
    }

    /// Immediate teardown for failed connects: SIGKILL, reap, unlink.
    async fn teardown_now(&mut self) {
        self.state = TunnelState::Closed;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        remove_socket_file(&self.local_path);
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        // kill_on_drop reaps the child; the socket file needs manual care.
        if self.state != TunnelState::Closed {
            if let Some(child) = self.child.as_mut() {
                let _ = child.start_kill();
            }
            remove_socket_file(&self.local_path);
        }
    }
}

fn remove_socket_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "failed to remove forwarding socket");
        }
    }
}

fn send_sigterm(pid: i32) -> std::io::Result<()> {
    if pid <= 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "invalid pid",
        ));
    }

    // SAFETY: libc::kill is called with a validated positive PID and
    // SIGTERM to request graceful shutdown of the ssh client.
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Shared handle that ties a tunnel's lifetime to its connection.
///
/// The stream returned by [`SshDialer::dial`] holds the strong reference;
/// the dialer's registry holds a weak one so `shutdown` can still reach
/// live tunnels.
#[derive(Debug)]
pub struct TunnelHandle {
    inner: Mutex<Option<SshTunnel>>,
}

impl TunnelHandle {
    fn new(tunnel: SshTunnel) -> Self {
        Self {
            inner: Mutex::new(Some(tunnel)),
        }
    }

    /// Gracefully closes the tunnel, once.
    pub async fn shutdown(&self) -> Result<()> {
        let tunnel = self.inner.lock().expect("tunnel handle poisoned").take();
        match tunnel {
            Some(mut tunnel) => tunnel.close().await,
            None => Ok(()),
        }
    }
}

/// A live tunneled connection: a Unix-socket stream plus the tunnel
/// keeping it alive. Dropping the stream drops the tunnel, which kills the
/// ssh child and removes the forwarding socket.
#[derive(Debug)]
pub struct SshStream {
    stream: UnixStream,
    tunnel: Arc<TunnelHandle>,
}

impl SshStream {
    /// Handle for explicit graceful shutdown.
    #[must_use]
    pub fn tunnel(&self) -> Arc<TunnelHandle> {
        Arc::clone(&self.tunnel)
    }
}

impl AsyncRead for SshStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for SshStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// Dials ssh-tunneled endpoints for the pooled client.
///
/// One fresh [`SshTunnel`] per dial: the pooled client only dials on a pool
/// miss, and the pool key (full tunnel URI plus identity file, see
/// [`PoolKey::for_endpoint`]) guarantees distinct remote endpoints or
/// identity files never share a pooled tunnel.
#[derive(Clone)]
pub struct SshDialer {
    identity: Option<PathBuf>,
    tunnel_config: SshTunnelConfig,
    tunnels: Arc<Mutex<Vec<(PoolKey, Weak<TunnelHandle>)>>>,
}

impl SshDialer {
    /// Creates a dialer.
    ///
    /// An out-of-band identity file is validated here, before any
    /// connection attempt.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::IdentityFileNotFound`] when the identity
    /// file does not exist.
    pub fn new(identity: Option<PathBuf>, tunnel_config: SshTunnelConfig) -> Result<Self> {
        if let Some(identity) = &identity {
            if !identity.exists() {
                return Err(TransportError::IdentityFileNotFound(identity.clone()));
            }
        }

        Ok(Self {
            identity,
            tunnel_config,
            tunnels: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Opens a tunnel to the endpoint and returns the connected stream.
    ///
    /// # Errors
    ///
    /// Propagates identity validation (for a URI-supplied identity file,
    /// checked before the child is spawned) and tunnel establishment
    /// errors.
    pub async fn dial(&self, endpoint: &EndpointUri) -> Result<SshStream> {
        let key = PoolKey::for_endpoint(endpoint, self.identity.as_deref());
        if let Some(identity) = key.identity_file() {
            if !identity.exists() {
                return Err(TransportError::IdentityFileNotFound(identity.to_path_buf()));
            }
        }

        let mut tunnel = SshTunnel::new(endpoint, key.identity_file(), self.tunnel_config.clone())?;
        tracing::debug!(
            endpoint = %endpoint,
            local = %tunnel.local_socket_path().display(),
            "opening ssh tunnel"
        );
        let stream = tunnel.connect().await?;
        let handle = Arc::new(TunnelHandle::new(tunnel));

        let mut tunnels = self.tunnels.lock().expect("tunnel registry poisoned");
        tunnels.retain(|(_, weak)| weak.strong_count() > 0);
        tunnels.push((key, Arc::downgrade(&handle)));
        drop(tunnels);

        Ok(SshStream {
            stream,
            tunnel: handle,
        })
    }

    /// Number of tunnels still referenced by live connections.
    #[must_use]
    pub fn active_tunnels(&self) -> usize {
        self.tunnels
            .lock()
            .expect("tunnel registry poisoned")
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Gracefully closes every tunnel the pool still references.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<TunnelHandle>> = {
            let mut tunnels = self.tunnels.lock().expect("tunnel registry poisoned");
            let handles = tunnels
                .iter()
                .filter_map(|(_, weak)| weak.upgrade())
                .collect();
            tunnels.clear();
            handles
        };

        for handle in handles {
            if let Err(e) = handle.shutdown().await {
                tracing::warn!(error = %e, "ssh tunnel shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SshDialer, SshTunnel, SshTunnelConfig};
    use crate::error::TransportError;
    use crate::uri::EndpointUri;
    use std::path::PathBuf;

    #[test]
    fn missing_identity_file_fails_at_construction() {
        let config = SshTunnelConfig::new("/tmp");
        let err = SshDialer::new(Some(PathBuf::from("/nonexistent/id_ed25519")), config)
            .err()
            .expect("construction should fail");
        assert!(matches!(err, TransportError::IdentityFileNotFound(_)));
    }

    #[test]
    fn tunnel_rejects_non_ssh_endpoints() {
        let endpoint = EndpointUri::parse("unix:///run/podman.sock").unwrap();
        let err = SshTunnel::new(&endpoint, None, SshTunnelConfig::new("/tmp")).unwrap_err();
        assert!(matches!(err, TransportError::InvalidUri { .. }));
    }

    #[test]
    fn local_socket_paths_are_unique_per_instance() {
        let endpoint = EndpointUri::parse("ssh://core@host/run/podman.sock").unwrap();
        let a = SshTunnel::new(&endpoint, None, SshTunnelConfig::new("/tmp")).unwrap();
        let b = SshTunnel::new(&endpoint, None, SshTunnelConfig::new("/tmp")).unwrap();
        assert_ne!(a.local_socket_path(), b.local_socket_path());
        assert!(a.local_socket_path().starts_with("/tmp"));
    }

    #[test]
    fn identity_from_uri_query_is_picked_up() {
        let endpoint =
            EndpointUri::parse("ssh://core@host/run/podman.sock?identity=/some/id").unwrap();
        let tunnel = SshTunnel::new(&endpoint, None, SshTunnelConfig::new("/tmp")).unwrap();
        assert_eq!(tunnel.identity.as_deref(), Some(std::path::Path::new("/some/id")));
    }
}
