#![allow(dead_code)]

use std::{net::SocketAddr, time::Duration};

use color_eyre::Result;
use lcr_bridge::{
    client::ClientHandle,
    config::{Config, SourceKind},
    hub::HubHandle,
    server::SNAPSHOT_ROUTE,
    store::{ReadingStore, Snapshot},
};
use tokio::{sync::oneshot, time::timeout};
use tracing::info;

/// A simulation which only produces the reading sent right after `start`,
/// since the next one is a long way off.
pub fn simulation_config() -> Config {
    let mut config = Config {
        source: SourceKind::Simulation,
        ..Default::default()
    };
    config.simulation.interval_ms = 600_000;
    config.simulation.port_label = "SIMULATED".into();
    config.simulation.seed = Some(1);

    config
}

pub async fn start_server_with_config(config: Config) -> u16 {
    let (port_tx, port_rx) = oneshot::channel();

    tokio::spawn(async move { lcr_bridge::server::run_any_port(config, port_tx).await });
    port_rx
        .await
        .expect("Server should reply with allocated port")
}

pub async fn start_simulation_server() -> u16 {
    start_server_with_config(simulation_config()).await
}

/// Serve the routes from a hub the test controls.
/// Nothing publishes to it unless the test does.
pub async fn start_app(config: &Config) -> (u16, HubHandle) {
    let store = ReadingStore::new();
    let (commands, _) = tokio::sync::mpsc::unbounded_channel();
    let hub = HubHandle::new(store.current_snapshot(), commands);

    let app = lcr_bridge::server::app(hub.clone(), config);

    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Should bind");
    let port = listener.local_addr().expect("Should have address").port();

    let server = axum::Server::from_tcp(listener)
        .expect("Should serve from listener")
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    tokio::spawn(server);

    (port, hub)
}

pub async fn connect(port: u16) -> Result<ClientHandle> {
    info!("Connecting to server on port {port}");
    Ok(ClientHandle::new("127.0.0.1", port).await?)
}

pub async fn next_snapshot(client: &mut ClientHandle) -> Result<Snapshot> {
    let snapshot = timeout(Duration::from_secs(5), client.next_snapshot())
        .await?
        .ok_or_else(|| color_eyre::eyre::eyre!("Stream closed"))??;

    Ok(snapshot)
}

pub async fn get(port: u16, path: &str) -> Result<hyper::Response<hyper::Body>> {
    let uri = format!("http://127.0.0.1:{port}{path}").parse()?;
    let request = hyper::Request::get::<hyper::Uri>(uri)
        .header("origin", "http://example.com")
        .body(hyper::Body::empty())?;

    Ok(hyper::Client::new().request(request).await?)
}

pub async fn get_snapshot_json(port: u16) -> Result<serde_json::Value> {
    let response = get(port, SNAPSHOT_ROUTE).await?;
    assert_eq!(response.status(), hyper::StatusCode::OK);

    let body = hyper::body::to_bytes(response.into_body()).await?;

    Ok(serde_json::from_slice(&body)?)
}

pub async fn get_snapshot(port: u16) -> Result<Snapshot> {
    Ok(serde_json::from_value(get_snapshot_json(port).await?)?)
}
