//! Unix dialer failure modes and round trips.
//!
//! The dialer must surface OS connect errors unchanged so callers can tell
//! "no such file" from "not a socket" from "nobody listening".

use podlink_transport::{EndpointUri, TransportError, UnixDialer};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

fn endpoint(path: &std::path::Path) -> EndpointUri {
    EndpointUri::parse(&format!("unix://{}", path.display())).unwrap()
}

fn io_kind(err: &TransportError) -> Option<std::io::ErrorKind> {
    match err {
        TransportError::Io(e) => Some(e.kind()),
        _ => None,
    }
}

#[tokio::test]
async fn dialing_missing_path_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = UnixDialer::new()
        .dial(&endpoint(&dir.path().join("missing.sock")))
        .await
        .unwrap_err();
    assert_eq!(io_kind(&err), Some(std::io::ErrorKind::NotFound));
}

#[tokio::test]
async fn dialing_a_regular_file_is_not_not_found() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("not-a-socket");
    std::fs::write(&path, b"plain file").unwrap();

    let err = UnixDialer::new().dial(&endpoint(&path)).await.unwrap_err();
    // Linux reports ECONNREFUSED here; the load-bearing property is that
    // it is distinguishable from a missing path.
    assert_ne!(io_kind(&err), Some(std::io::ErrorKind::NotFound));
    assert!(io_kind(&err).is_some());
}

#[tokio::test]
async fn dialing_a_dead_socket_is_connection_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dead.sock");
    // Bind then drop: the socket file stays behind with no listener.
    drop(UnixListener::bind(&path).unwrap());

    let err = UnixDialer::new().dial(&endpoint(&path)).await.unwrap_err();
    assert_eq!(io_kind(&err), Some(std::io::ErrorKind::ConnectionRefused));
}

#[tokio::test]
async fn dial_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("live.sock");
    let listener = UnixListener::bind(&path).unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        stream.write_all(&buf).await.unwrap();
    });

    let mut stream = UnixDialer::new()
        .with_timeout(Duration::from_secs(5))
        .dial(&endpoint(&path))
        .await
        .unwrap();
    stream.write_all(b"ping").await.unwrap();
    let mut echo = [0u8; 4];
    stream.read_exact(&mut echo).await.unwrap();
    assert_eq!(&echo, b"ping");

    server.await.unwrap();
}

#[tokio::test]
async fn dialing_percent_encoded_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("enc.sock");
    let _listener = UnixListener::bind(&path).unwrap();

    let encoded = path
        .display()
        .to_string()
        .replace('/', "%2F");
    let endpoint = EndpointUri::parse(&format!("http+unix://{encoded}")).unwrap();
    UnixDialer::new().dial(&endpoint).await.unwrap();
}

#[tokio::test]
async fn dialing_non_unix_endpoint_is_invalid() {
    let endpoint = EndpointUri::parse("tcp://127.0.0.1:9").unwrap();
    let err = UnixDialer::new().dial(&endpoint).await.unwrap_err();
    assert!(matches!(err, TransportError::InvalidUri { .. }));
}
