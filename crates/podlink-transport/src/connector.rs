//! Dialer integration for `hyper_util`'s pooled legacy client.
//!
//! [`Connector`] is the client's "dial a connection for this authority"
//! step: it implements `tower_service::Service<http::Uri>`, decodes the
//! hex pool authority produced by [`EndpointUri::to_request_uri`] back
//! into an endpoint, and dispatches to the scheme-appropriate dialer. The
//! pooled client reuses the returned connection for every later request
//! whose (scheme, authority) pool key matches.
//!
//! TLS is not handled at this layer.

use crate::error::{Result, TransportError};
use crate::runtime;
use crate::ssh::{SshDialer, SshStream, SshTunnelConfig};
use crate::unix::UnixDialer;
use crate::uri::{EndpointUri, SUPPORTED_SCHEMES};
use http::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};
use tower_service::Service;

/// A live daemon connection, whichever transport produced it.
#[derive(Debug)]
pub enum PodStream {
    /// Direct Unix-socket connection.
    Unix(UnixStream),
    /// Connection through an ssh tunnel (owns the tunnel).
    Ssh(SshStream),
    /// Plain TCP connection.
    Tcp(TcpStream),
}

impl Connection for PodStream {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

impl AsyncRead for PodStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Self::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Ssh(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for PodStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match &mut *self {
            Self::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Ssh(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Self::Unix(stream) => Pin::new(stream).poll_flush(cx),
            Self::Ssh(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Self::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Ssh(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Builder for [`Connector`].
#[derive(Default)]
pub struct ConnectorBuilder {
    identity: Option<PathBuf>,
    unix: Option<UnixDialer>,
    tunnel: Option<SshTunnelConfig>,
}

impl ConnectorBuilder {
    /// Out-of-band ssh identity file, validated eagerly at `build`.
    #[must_use]
    pub fn identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity = Some(path.into());
        self
    }

    /// Replaces the default Unix dialer (e.g. to set a connect timeout).
    #[must_use]
    pub fn unix_dialer(mut self, dialer: UnixDialer) -> Self {
        self.unix = Some(dialer);
        self
    }

    /// Replaces the default tunnel configuration.
    #[must_use]
    pub fn tunnel_config(mut self, config: SshTunnelConfig) -> Self {
        self.tunnel = Some(config);
        self
    }

    /// Builds the connector.
    ///
    /// The runtime directory fallback is resolved here, once, when no
    /// tunnel config was supplied.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::IdentityFileNotFound`] for a missing
    /// identity file and I/O errors from runtime-directory resolution.
    pub fn build(self) -> Result<Connector> {
        let tunnel = match self.tunnel {
            Some(config) => config,
            None => SshTunnelConfig::new(runtime::runtime_dir()?),
        };
        let ssh = SshDialer::new(self.identity, tunnel)?;

        Ok(Connector {
            unix: self.unix.unwrap_or_default(),
            ssh,
        })
    }
}

/// Scheme-dispatching dialer for the pooled HTTP client.
#[derive(Clone)]
pub struct Connector {
    unix: UnixDialer,
    ssh: SshDialer,
}

impl Connector {
    /// Connector with default dialers.
    ///
    /// # Errors
    ///
    /// See [`ConnectorBuilder::build`].
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder() -> ConnectorBuilder {
        ConnectorBuilder::default()
    }

    /// The ssh dialer, for explicit tunnel shutdown.
    #[must_use]
    pub fn ssh_dialer(&self) -> &SshDialer {
        &self.ssh
    }

    /// Dials the endpoint encoded in a request URI.
    ///
    /// # Errors
    ///
    /// Returns configuration errors from authority decoding and the
    /// scheme-appropriate dialer's establishment errors, unchanged.
    pub async fn dial(&self, uri: &Uri) -> Result<PodStream> {
        let scheme = uri.scheme_str().unwrap_or_default();
        let authority = uri
            .authority()
            .ok_or_else(|| TransportError::InvalidUri {
                uri: uri.to_string(),
                reason: "missing authority".to_string(),
            })?
            .as_str();

        match scheme {
            "unix" | "http+unix" => {
                let endpoint = EndpointUri::from_pool_authority(authority)?;
                let stream = self.unix.dial(&endpoint).await?;
                Ok(PodStream::Unix(stream))
            }
            "ssh" | "http+ssh" => {
                let endpoint = EndpointUri::from_pool_authority(authority)?;
                let stream = self.ssh.dial(&endpoint).await?;
                Ok(PodStream::Ssh(stream))
            }
            "http" | "tcp" => {
                let stream = TcpStream::connect(authority).await?;
                Ok(PodStream::Tcp(stream))
            }
            other => Err(TransportError::UnsupportedScheme {
                scheme: other.to_string(),
                supported: SUPPORTED_SCHEMES,
            }),
        }
    }
}

impl Service<Uri> for Connector {
    type Response = TokioIo<PodStream>;
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let connector = self.clone();
        Box::pin(async move { connector.dial(&uri).await.map(TokioIo::new) })
    }
}

#[cfg(test)]
mod tests {
    use super::Connector;
    use crate::error::TransportError;
    use crate::ssh::SshTunnelConfig;

    #[tokio::test]
    async fn rejects_unsupported_request_scheme() {
        let connector = Connector::builder()
            .tunnel_config(SshTunnelConfig::new("/tmp"))
            .build()
            .unwrap();
        let uri: http::Uri = "ftp://host/file".parse().unwrap();
        let err = connector.dial(&uri).await.unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedScheme { .. }));
    }

    #[tokio::test]
    async fn rejects_missing_authority() {
        let connector = Connector::builder()
            .tunnel_config(SshTunnelConfig::new("/tmp"))
            .build()
            .unwrap();
        let uri: http::Uri = "/just/a/path".parse().unwrap();
        let err = connector.dial(&uri).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidUri { .. }));
    }
}
