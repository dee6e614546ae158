//! # podlink-transport
//!
//! Transport layer for talking to a Podman-compatible container daemon
//! over non-TCP endpoints.
//!
//! The daemon's REST API is reachable through a local Unix domain socket
//! or a remote Unix domain socket tunneled through an external `ssh`
//! client. This crate provides the dialers for both, the pool-key
//! derivation that lets a pooled HTTP client group connections per
//! distinct endpoint, and the connector that plugs everything into
//! `hyper_util`'s legacy client.
//!
//! ## Architecture
//!
//! ```text
//! request ──► pooled client ──► PoolKey / hex authority ──► pool hit? reuse
//!                                        │
//!                                   pool miss
//!                                        ▼
//!                              ┌──── Connector ────┐
//!                              ▼                   ▼
//!                         UnixDialer          SshDialer
//!                              │                   │
//!                      /run/…/podman.sock     ssh -N -L local:remote
//!                                                  │
//!                                        <runtime_dir>/podlink-ssh-….sock
//! ```
//!
//! Multiplexed log/attach bodies returned by the daemon are decoded by the
//! companion `podlink-wire` crate.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod connector;
pub mod error;
pub mod pool;
pub mod runtime;
pub mod ssh;
pub mod unix;
pub mod uri;

pub use connector::{Connector, ConnectorBuilder, PodStream};
pub use error::{Result, TransportError};
pub use pool::{PoolKey, PoolKeyBuilder};
pub use ssh::{SshDialer, SshStream, SshTunnel, SshTunnelConfig};
pub use unix::UnixDialer;
pub use uri::{EndpointUri, Scheme, SshTarget};
