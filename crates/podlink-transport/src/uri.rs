//! Endpoint URIs for non-TCP daemon addresses.
//!
//! A daemon endpoint is addressed by one of:
//!
//! - `unix:///run/podman/podman.sock` or `http+unix://%2Frun%2Fpodman%2Fpodman.sock`
//!   (the path component is a filesystem path, possibly percent-encoded in
//!   the authority position)
//! - `ssh://user@host[:port]/run/user/1000/podman/podman.sock[?identity=...]`
//!   or `http+ssh://...`
//! - `tcp://host:port` / `http://host:port`
//!
//! Unsupported schemes fail at parse time, not at first dial.

use crate::error::{Result, TransportError};
use percent_encoding::percent_decode_str;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// Supported endpoint schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Local Unix domain socket.
    Unix,
    /// Local Unix domain socket, HTTP-flavored alias.
    HttpUnix,
    /// Remote Unix domain socket reached through an ssh tunnel.
    Ssh,
    /// Remote Unix domain socket reached through an ssh tunnel, HTTP-flavored alias.
    HttpSsh,
    /// Plain TCP.
    Tcp,
    /// Plain TCP, HTTP-flavored alias.
    Http,
}

/// Comma-separated list of supported schemes, for error messages.
pub const SUPPORTED_SCHEMES: &str = "unix, http+unix, ssh, http+ssh, tcp, http";

impl Scheme {
    /// Returns the scheme as it appears in a URI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unix => "unix",
            Self::HttpUnix => "http+unix",
            Self::Ssh => "ssh",
            Self::HttpSsh => "http+ssh",
            Self::Tcp => "tcp",
            Self::Http => "http",
        }
    }

    /// True for the Unix-socket schemes.
    #[must_use]
    pub const fn is_unix(self) -> bool {
        matches!(self, Self::Unix | Self::HttpUnix)
    }

    /// True for the ssh-tunneled schemes.
    #[must_use]
    pub const fn is_ssh(self) -> bool {
        matches!(self, Self::Ssh | Self::HttpSsh)
    }
}

impl FromStr for Scheme {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "unix" => Ok(Self::Unix),
            "http+unix" => Ok(Self::HttpUnix),
            "ssh" => Ok(Self::Ssh),
            "http+ssh" => Ok(Self::HttpSsh),
            "tcp" => Ok(Self::Tcp),
            "http" => Ok(Self::Http),
            other => Err(TransportError::UnsupportedScheme {
                scheme: other.to_string(),
                supported: SUPPORTED_SCHEMES,
            }),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote half of an ssh-tunneled endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    /// Login user, if given.
    pub user: Option<String>,
    /// Remote host.
    pub host: String,
    /// Remote port, if given (ssh default otherwise).
    pub port: Option<u16>,
    /// Path of the daemon socket on the remote host.
    pub remote_path: PathBuf,
    /// Identity file from the `identity` query parameter.
    pub identity: Option<PathBuf>,
}

impl SshTarget {
    /// Returns the `ssh://user@host[:port]` destination handed to the ssh
    /// client (without the remote socket path).
    #[must_use]
    pub fn destination(&self) -> String {
        let mut out = String::from("ssh://");
        if let Some(user) = &self.user {
            out.push_str(user);
            out.push('@');
        }
        out.push_str(&self.host);
        if let Some(port) = self.port {
            out.push(':');
            out.push_str(&port.to_string());
        }
        out
    }
}

/// What an endpoint actually addresses, per scheme family.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Unix(PathBuf),
    Ssh(SshTarget),
    Tcp(String),
}

/// A parsed daemon endpoint address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUri {
    raw: String,
    scheme: Scheme,
    target: Target,
}

impl EndpointUri {
    /// Parses an endpoint URI.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnsupportedScheme`] for schemes outside the
    /// supported set and [`TransportError::InvalidUri`] for anything the
    /// scheme's grammar rejects.
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme_str, rest) = uri.split_once("://").ok_or_else(|| invalid(uri, "missing scheme"))?;
        let scheme: Scheme = scheme_str.parse()?;

        let target = if scheme.is_unix() {
            // The authority position carries a filesystem path, possibly
            // percent-encoded (podman-style), never a real host.
            let rest = rest.split_once('?').map_or(rest, |(path, _)| path);
            if rest.is_empty() {
                return Err(invalid(uri, "missing socket path"));
            }
            let decoded = percent_decode_str(rest)
                .decode_utf8()
                .map_err(|e| invalid(uri, &format!("socket path is not UTF-8: {e}")))?;
            Target::Unix(PathBuf::from(decoded.as_ref()))
        } else if scheme.is_ssh() {
            Target::Ssh(parse_ssh(uri)?)
        } else {
            let authority = rest.split(['/', '?']).next().unwrap_or_default();
            if authority.is_empty() {
                return Err(invalid(uri, "missing host"));
            }
            Target::Tcp(authority.to_string())
        };

        Ok(Self {
            raw: uri.to_string(),
            scheme,
            target,
        })
    }

    /// Returns the endpoint scheme.
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns the URI exactly as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the local socket path for Unix-socket endpoints.
    #[must_use]
    pub fn socket_path(&self) -> Option<&Path> {
        match &self.target {
            Target::Unix(path) => Some(path),
            _ => None,
        }
    }

    /// Returns the ssh target for tunneled endpoints.
    #[must_use]
    pub fn ssh_target(&self) -> Option<&SshTarget> {
        match &self.target {
            Target::Ssh(target) => Some(target),
            _ => None,
        }
    }

    /// Returns the `host:port` authority for TCP endpoints.
    #[must_use]
    pub fn tcp_authority(&self) -> Option<&str> {
        match &self.target {
            Target::Tcp(authority) => Some(authority),
            _ => None,
        }
    }

    /// Host portion used for pool-key derivation.
    ///
    /// Socket-based schemes have no meaningful host, so `localhost` stands
    /// in; the endpoint URI itself is the true pool discriminator.
    #[must_use]
    pub fn pool_host(&self) -> &str {
        match &self.target {
            Target::Unix(_) => "localhost",
            Target::Ssh(target) => &target.host,
            Target::Tcp(authority) => authority,
        }
    }

    /// Embeds this endpoint into a request [`http::Uri`].
    ///
    /// For socket-based schemes the authority is a hex encoding of the full
    /// endpoint URI, so the pooled client's (scheme, authority) connection
    /// key tells distinct sockets apart. The connector reverses the
    /// encoding when dialing. TCP endpoints keep their real authority.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] when `path_and_query` does not
    /// form a valid URI.
    pub fn to_request_uri(&self, path_and_query: &str) -> Result<http::Uri> {
        let (scheme, authority) = match &self.target {
            Target::Tcp(authority) => ("http", authority.clone()),
            _ => (self.scheme.as_str(), hex::encode(self.raw.as_bytes())),
        };

        http::Uri::builder()
            .scheme(scheme)
            .authority(authority)
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| invalid(&self.raw, &format!("bad request path '{path_and_query}': {e}")))
    }

    /// Recovers the endpoint from a hex pool authority produced by
    /// [`EndpointUri::to_request_uri`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] when the authority is not hex
    /// or does not decode to a parseable endpoint.
    pub fn from_pool_authority(authority: &str) -> Result<Self> {
        let bytes = hex::decode(authority)
            .map_err(|e| invalid(authority, &format!("not a hex pool authority: {e}")))?;
        let raw = String::from_utf8(bytes)
            .map_err(|e| invalid(authority, &format!("pool authority is not UTF-8: {e}")))?;
        Self::parse(&raw)
    }
}

impl fmt::Display for EndpointUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn invalid(uri: &str, reason: &str) -> TransportError {
    TransportError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_ssh(uri: &str) -> Result<SshTarget> {
    let url = Url::parse(uri).map_err(|e| invalid(uri, &e.to_string()))?;

    let host = url
        .host_str()
        .ok_or_else(|| invalid(uri, "missing ssh host"))?
        .to_string();
    let user = match url.username() {
        "" => None,
        user => Some(user.to_string()),
    };
    let remote_path = match url.path() {
        "" | "/" => return Err(invalid(uri, "missing remote socket path")),
        path => PathBuf::from(path),
    };
    let identity = url
        .query_pairs()
        .find(|(key, _)| key == "identity")
        .map(|(_, value)| PathBuf::from(value.as_ref()));

    Ok(SshTarget {
        user,
        host,
        port: url.port(),
        remote_path,
        identity,
    })
}

#[cfg(test)]
mod tests {
    use super::{EndpointUri, Scheme, SUPPORTED_SCHEMES};
    use crate::error::TransportError;
    use std::path::Path;

    #[test]
    fn parses_plain_unix_uri() {
        let uri = EndpointUri::parse("unix:///run/podman/podman.sock").unwrap();
        assert_eq!(uri.scheme(), Scheme::Unix);
        assert_eq!(
            uri.socket_path(),
            Some(Path::new("/run/podman/podman.sock"))
        );
        assert_eq!(uri.pool_host(), "localhost");
    }

    #[test]
    fn parses_percent_encoded_unix_uri() {
        let uri = EndpointUri::parse("http+unix://%2Frun%2Fpodman%2Fpodman.sock").unwrap();
        assert_eq!(uri.scheme(), Scheme::HttpUnix);
        assert_eq!(
            uri.socket_path(),
            Some(Path::new("/run/podman/podman.sock"))
        );
    }

    #[test]
    fn parses_ssh_uri_with_identity() {
        let uri = EndpointUri::parse(
            "ssh://core@pi.example.com:2222/run/user/1000/podman/podman.sock?identity=/home/core/.ssh/id_ed25519",
        )
        .unwrap();
        let target = uri.ssh_target().unwrap();
        assert_eq!(target.user.as_deref(), Some("core"));
        assert_eq!(target.host, "pi.example.com");
        assert_eq!(target.port, Some(2222));
        assert_eq!(
            target.remote_path,
            Path::new("/run/user/1000/podman/podman.sock")
        );
        assert_eq!(
            target.identity.as_deref(),
            Some(Path::new("/home/core/.ssh/id_ed25519"))
        );
        assert_eq!(target.destination(), "ssh://core@pi.example.com:2222");
    }

    #[test]
    fn ssh_uri_without_remote_path_is_invalid() {
        let err = EndpointUri::parse("ssh://core@pi.example.com").unwrap_err();
        assert!(matches!(err, TransportError::InvalidUri { .. }));
    }

    #[test]
    fn unsupported_scheme_fails_fast_and_lists_supported_set() {
        let err = EndpointUri::parse("ftp://example.com/socket").unwrap_err();
        match err {
            TransportError::UnsupportedScheme { scheme, supported } => {
                assert_eq!(scheme, "ftp");
                assert_eq!(supported, SUPPORTED_SCHEMES);
            }
            other => panic!("expected UnsupportedScheme, got {other:?}"),
        }
    }

    #[test]
    fn tcp_uri_keeps_real_authority_in_request_uri() {
        let uri = EndpointUri::parse("tcp://127.0.0.1:8080").unwrap();
        let request = uri.to_request_uri("/v4.0.0/libpod/_ping").unwrap();
        assert_eq!(request.scheme_str(), Some("http"));
        assert_eq!(request.authority().unwrap().as_str(), "127.0.0.1:8080");
    }

    #[test]
    fn request_uri_round_trips_through_pool_authority() {
        let uri = EndpointUri::parse("unix:///tmp/Case-Sensitive.sock").unwrap();
        let request = uri.to_request_uri("/v4.0.0/libpod/containers/json").unwrap();

        let authority = request.authority().unwrap().as_str();
        let recovered = EndpointUri::from_pool_authority(authority).unwrap();
        assert_eq!(recovered, uri);
        // Hex keeps the socket path's case intact through the authority,
        // which hosts would otherwise normalize.
        assert_eq!(
            recovered.socket_path(),
            Some(Path::new("/tmp/Case-Sensitive.sock"))
        );
    }

    #[test]
    fn distinct_remote_sockets_get_distinct_pool_authorities() {
        let a = EndpointUri::parse("ssh://core@host/run/a.sock").unwrap();
        let b = EndpointUri::parse("ssh://core@host/run/b.sock").unwrap();
        let ua = a.to_request_uri("/_ping").unwrap();
        let ub = b.to_request_uri("/_ping").unwrap();
        assert_ne!(ua.authority(), ub.authority());
    }
}
