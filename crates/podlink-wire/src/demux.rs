//! Frame decoding for multiplexed log/attach streams.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Number of bytes in the fixed frame header (`tag` + reserved + `length`).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Stream a frame's payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Container stdout (tag byte `1`).
    Stdout,
    /// Container stderr (tag byte `2`).
    Stderr,
    /// Any other tag byte. Recognized but not routed anywhere.
    Unrecognized(u8),
}

impl StreamKind {
    /// Converts a wire tag byte into a typed stream kind.
    #[must_use]
    pub const fn from_u8(tag: u8) -> Self {
        match tag {
            1 => Self::Stdout,
            2 => Self::Stderr,
            other => Self::Unrecognized(other),
        }
    }
}

/// Reads the payload length from a frame header.
///
/// Bytes 1-3 are reserved and ignored, not validated.
fn payload_len(header: &[u8]) -> usize {
    u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize
}

/// Demultiplexes a complete in-memory buffer into (stdout, stderr).
///
/// Payloads are concatenated per stream in wire order. Decoding stops at a
/// trailing remnant shorter than a header or at a frame whose declared
/// payload exceeds the remaining bytes; both are dropped silently rather
/// than reported, since a truncated tail is usually an unflushed producer,
/// not corruption. Frames with an unrecognized tag are consumed but
/// contribute to neither output.
#[must_use]
pub fn demux(buf: &[u8]) -> (Bytes, Bytes) {
    let mut stdout = BytesMut::new();
    let mut stderr = BytesMut::new();

    let mut rest = buf;
    while rest.len() >= FRAME_HEADER_SIZE {
        let (header, body) = rest.split_at(FRAME_HEADER_SIZE);
        let len = payload_len(header);
        if body.len() < len {
            // Incomplete final frame; stop without consuming it.
            break;
        }

        let (payload, remaining) = body.split_at(len);
        match StreamKind::from_u8(header[0]) {
            StreamKind::Stdout => stdout.extend_from_slice(payload),
            StreamKind::Stderr => stderr.extend_from_slice(payload),
            StreamKind::Unrecognized(_) => {}
        }
        rest = remaining;
    }

    (stdout.freeze(), stderr.freeze())
}

/// Lazy frame reader over a live byte source.
///
/// Produces each frame's payload as it arrives so callers can follow logs
/// incrementally instead of buffering the whole response. The sequence is
/// finite and non-restartable: any short read (end of stream, unflushed
/// producer) ends it without yielding a partial payload.
///
/// Unlike [`demux`], this mode does not separate stdout from stderr; use
/// [`Frames::next_tagged`] when the caller wants to route output.
pub struct Frames<R> {
    source: R,
    done: bool,
}

impl<R: AsyncRead + Unpin> Frames<R> {
    /// Wraps a byte source in a frame reader.
    pub fn new(source: R) -> Self {
        Self {
            source,
            done: false,
        }
    }

    /// Returns the next payload, or `None` at end of stream.
    ///
    /// Zero-length frames are skipped without being yielded.
    pub async fn next(&mut self) -> Option<Bytes> {
        self.next_tagged().await.map(|(_, payload)| payload)
    }

    /// Returns the next payload together with its stream kind.
    pub async fn next_tagged(&mut self) -> Option<(StreamKind, Bytes)> {
        loop {
            if self.done {
                return None;
            }

            let mut header = [0u8; FRAME_HEADER_SIZE];
            if self.source.read_exact(&mut header).await.is_err() {
                self.done = true;
                return None;
            }

            let len = payload_len(&header);
            if len == 0 {
                continue;
            }

            let mut payload = vec![0u8; len];
            if self.source.read_exact(&mut payload).await.is_err() {
                self.done = true;
                return None;
            }

            return Some((StreamKind::from_u8(header[0]), Bytes::from(payload)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{demux, Frames, StreamKind};

    /// Encodes one frame in the daemon's wire format.
    fn frame(tag: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![tag, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn concat(frames: &[Vec<u8>]) -> Vec<u8> {
        frames.iter().flatten().copied().collect()
    }

    #[test]
    fn stream_kind_from_tag() {
        assert_eq!(StreamKind::from_u8(1), StreamKind::Stdout);
        assert_eq!(StreamKind::from_u8(2), StreamKind::Stderr);
        assert_eq!(StreamKind::from_u8(0), StreamKind::Unrecognized(0));
        assert_eq!(StreamKind::from_u8(9), StreamKind::Unrecognized(9));
    }

    #[test]
    fn demux_partitions_streams_in_order() {
        let buf = concat(&[frame(1, b"ab"), frame(2, b"cd"), frame(1, b"ef")]);
        let (stdout, stderr) = demux(&buf);
        assert_eq!(&stdout[..], b"abef");
        assert_eq!(&stderr[..], b"cd");
    }

    #[test]
    fn demux_empty_input() {
        let (stdout, stderr) = demux(&[]);
        assert!(stdout.is_empty());
        assert!(stderr.is_empty());
    }

    #[test]
    fn demux_drops_truncated_trailing_frame() {
        let mut buf = frame(1, b"complete");
        // Header declaring 100 payload bytes, but only 3 present.
        buf.extend_from_slice(&[2, 0, 0, 0, 0, 0, 0, 100]);
        buf.extend_from_slice(b"xyz");

        let (stdout, stderr) = demux(&buf);
        assert_eq!(&stdout[..], b"complete");
        assert!(stderr.is_empty());
    }

    #[test]
    fn demux_drops_trailing_garbage_shorter_than_header() {
        let mut buf = frame(2, b"err");
        buf.extend_from_slice(&[1, 2, 3]);

        let (stdout, stderr) = demux(&buf);
        assert!(stdout.is_empty());
        assert_eq!(&stderr[..], b"err");
    }

    #[test]
    fn demux_ignores_unrecognized_tag_and_continues() {
        let buf = concat(&[frame(1, b"keep"), frame(9, b"skip"), frame(2, b"also")]);
        let (stdout, stderr) = demux(&buf);
        assert_eq!(&stdout[..], b"keep");
        assert_eq!(&stderr[..], b"also");
    }

    #[tokio::test]
    async fn frames_yields_payloads_lazily() {
        let buf = concat(&[frame(1, b"one"), frame(2, b"two")]);
        let mut frames = Frames::new(&buf[..]);

        assert_eq!(frames.next().await.as_deref(), Some(&b"one"[..]));
        assert_eq!(frames.next().await.as_deref(), Some(&b"two"[..]));
        assert!(frames.next().await.is_none());
        // Non-restartable once terminated.
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn frames_skips_zero_length_frames() {
        let buf = concat(&[frame(1, b""), frame(2, b"data")]);
        let mut frames = Frames::new(&buf[..]);

        assert_eq!(frames.next().await.as_deref(), Some(&b"data"[..]));
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn frames_terminates_on_short_header_read() {
        let mut buf = frame(1, b"whole");
        buf.extend_from_slice(&[2, 0, 0]);

        let mut frames = Frames::new(&buf[..]);
        assert_eq!(frames.next().await.as_deref(), Some(&b"whole"[..]));
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn frames_terminates_on_short_payload_read() {
        let mut buf = vec![1, 0, 0, 0, 0, 0, 0, 50];
        buf.extend_from_slice(b"only-part");

        let mut frames = Frames::new(&buf[..]);
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn frames_tagged_reports_stream_kind() {
        let buf = concat(&[frame(1, b"out"), frame(2, b"err"), frame(7, b"???")]);
        let mut frames = Frames::new(&buf[..]);

        assert_eq!(
            frames.next_tagged().await,
            Some((StreamKind::Stdout, b"out"[..].into()))
        );
        assert_eq!(
            frames.next_tagged().await,
            Some((StreamKind::Stderr, b"err"[..].into()))
        );
        // Streaming mode yields unrecognized frames too; routing is the
        // caller's decision.
        assert_eq!(
            frames.next_tagged().await,
            Some((StreamKind::Unrecognized(7), b"???"[..].into()))
        );
        assert!(frames.next_tagged().await.is_none());
    }
}
