//! # podlink-wire
//!
//! Decoder for the multiplexed stream framing used by Podman-compatible
//! daemons when returning container logs and attach streams.
//!
//! A multiplexed body interleaves stdout and stderr as length-prefixed
//! frames:
//!
//! ```text
//! ┌────────┬───────────┬────────────────┬─────────────┐
//! │ 1 byte │  3 bytes  │    4 bytes     │  len bytes  │
//! │  tag   │ reserved  │ len (u32, BE)  │   payload   │
//! └────────┴───────────┴────────────────┴─────────────┘
//!   tag: 1 = stdout, 2 = stderr, other = unrecognized
//! ```
//!
//! Two decode modes share the same frame-boundary logic:
//!
//! - [`demux`]: bulk mode, for a complete in-memory body ("get logs once").
//!   Separates stdout from stderr.
//! - [`Frames`]: streaming mode, for a live response body ("follow logs").
//!   Yields payloads lazily, without separating streams.
//!
//! Malformed or truncated frames are never an error in either mode: a
//! concurrently-writing producer may simply not have flushed a complete
//! frame yet, so the decoder stops producing output instead of raising.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod demux;

pub use demux::{demux, Frames, StreamKind, FRAME_HEADER_SIZE};
