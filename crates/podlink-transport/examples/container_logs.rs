//! Fetches a container's logs from a daemon endpoint and demuxes them.
//!
//! ```bash
//! cargo run --example container_logs -- unix:///run/podman/podman.sock mycontainer
//! ```

use anyhow::Context;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use podlink_transport::{Connector, EndpointUri};
use std::io::Write;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let endpoint = args
        .next()
        .unwrap_or_else(|| "unix:///run/podman/podman.sock".to_string());
    let container = args.next().context("usage: container_logs <endpoint-uri> <container>")?;

    let endpoint = EndpointUri::parse(&endpoint)?;
    let connector = Connector::new()?;
    let client: Client<_, Full<Bytes>> = Client::builder(TokioExecutor::new()).build(connector);

    let uri = endpoint.to_request_uri(&format!(
        "/v4.0.0/libpod/containers/{container}/logs?stdout=true&stderr=true"
    ))?;
    let response = client
        .request(
            http::Request::get(uri)
                .header("Host", "localhost")
                .body(Full::default())?,
        )
        .await
        .context("request failed")?;
    anyhow::ensure!(
        response.status().is_success(),
        "daemon returned {}",
        response.status()
    );

    let body = response.into_body().collect().await?.to_bytes();
    let (stdout, stderr) = podlink_wire::demux(&body);
    std::io::stdout().write_all(&stdout)?;
    std::io::stderr().write_all(&stderr)?;
    Ok(())
}
