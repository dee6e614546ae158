//! Connection-pool identity derivation.
//!
//! A pooled HTTP client may only reuse a connection for a request when the
//! two are connection-interchangeable. [`PoolKey`] captures exactly the
//! attributes that decide interchangeability: normalized scheme and host,
//! order-independent header snapshots, ordered socket options, and the
//! transport-specific fields that discriminate endpoints whose (scheme,
//! host) pair is a placeholder: for socket-based schemes, the full
//! endpoint URI and the ssh identity file.
//!
//! Two ssh tunnels to the same host but different remote socket paths are
//! not interchangeable; omitting the endpoint URI from the key would alias
//! them onto one pooled connection.

use crate::uri::EndpointUri;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Immutable, hashable pool-lookup key.
///
/// Equality implies connection-interchangeability. Construct via
/// [`PoolKeyBuilder`], which performs the normalization; every attribute
/// not supplied stays `None` so the key's shape is always complete and
/// comparable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    scheme: String,
    host: String,
    headers: Option<BTreeMap<String, String>>,
    proxy_headers: Option<BTreeMap<String, String>>,
    socket_options: Option<Vec<(i32, i32, i32)>>,
    endpoint: Option<String>,
    identity_file: Option<PathBuf>,
}

impl PoolKey {
    /// Derives the key for an endpoint, merging in the transport-specific
    /// discriminators (full endpoint URI; identity file from the URI or the
    /// dialer's out-of-band configuration).
    #[must_use]
    pub fn for_endpoint(endpoint: &EndpointUri, identity: Option<&Path>) -> Self {
        let mut builder = PoolKeyBuilder::new(endpoint.scheme().as_str(), endpoint.pool_host())
            .endpoint(endpoint.as_str());
        let identity = identity.or_else(|| {
            endpoint
                .ssh_target()
                .and_then(|target| target.identity.as_deref())
        });
        if let Some(identity) = identity {
            builder = builder.identity_file(identity);
        }
        builder.build()
    }

    /// Hex authority string for the pooled client.
    ///
    /// Encodes the endpoint URI (which carries the true discriminator for
    /// socket-based schemes) so the client's (scheme, authority) pool key
    /// can never alias distinct endpoints. Falls back to `scheme://host`
    /// when no endpoint was supplied.
    #[must_use]
    pub fn authority(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => hex::encode(endpoint.as_bytes()),
            None => hex::encode(format!("{}://{}", self.scheme, self.host).as_bytes()),
        }
    }

    /// Normalized (lower-cased) scheme.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Normalized (lower-cased) host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Full endpoint URI, when the key discriminates a socket endpoint.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Identity file participating in the key.
    #[must_use]
    pub fn identity_file(&self) -> Option<&Path> {
        self.identity_file.as_deref()
    }
}

/// Builder that normalizes request attributes into a [`PoolKey`].
#[derive(Debug, Clone)]
pub struct PoolKeyBuilder {
    key: PoolKey,
}

impl PoolKeyBuilder {
    /// Starts a key for the given scheme and host.
    ///
    /// Both are lower-cased: pool identity is case-insensitive per RFC 3986,
    /// and for socket-based schemes the host is a placeholder anyway.
    #[must_use]
    pub fn new(scheme: &str, host: &str) -> Self {
        Self {
            key: PoolKey {
                scheme: scheme.to_ascii_lowercase(),
                host: host.to_ascii_lowercase(),
                headers: None,
                proxy_headers: None,
                socket_options: None,
                endpoint: None,
                identity_file: None,
            },
        }
    }

    /// Adds a request header. Insertion order never affects the key.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.key
            .headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Adds a proxy header. Insertion order never affects the key.
    #[must_use]
    pub fn proxy_header(mut self, name: &str, value: &str) -> Self {
        self.key
            .proxy_headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Appends a `(level, option, value)` socket option. Socket options are
    /// an ordered sequence, so order is preserved.
    #[must_use]
    pub fn socket_option(mut self, level: i32, option: i32, value: i32) -> Self {
        self.key
            .socket_options
            .get_or_insert_with(Vec::new)
            .push((level, option, value));
        self
    }

    /// Merges in the full endpoint URI, the true discriminator between
    /// otherwise-identical (scheme, host) pairs.
    #[must_use]
    pub fn endpoint(mut self, uri: &str) -> Self {
        self.key.endpoint = Some(uri.to_string());
        self
    }

    /// Merges in the ssh identity file path.
    #[must_use]
    pub fn identity_file(mut self, path: &Path) -> Self {
        self.key.identity_file = Some(path.to_path_buf());
        self
    }

    /// Finishes the key.
    #[must_use]
    pub fn build(self) -> PoolKey {
        self.key
    }
}
