use std::net::SocketAddr;

use axum::{
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, get_service},
    Extension, Json, Router,
};
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    config::{Config, SourceKind},
    error::Error,
    hub::HubHandle,
    source::{serial::SerialSource, simulation::Simulator, SourceHandle},
    websocket,
};

/// Where snapshots can be polled.
pub const SNAPSHOT_ROUTE: &str = "/api/resistance-data";

/// Where the websocket lives.
pub const WEBSOCKET_ROUTE: &str = "/ws";

fn start_source(config: &Config) -> SourceHandle {
    match config.source {
        SourceKind::Serial => SourceHandle::start(SerialSource::new(&config.serial)),
        SourceKind::Simulation => SourceHandle::start(Simulator::new(&config.simulation)),
    }
}

/// The routes, given a hub to serve from.
pub fn app(hub: HubHandle, config: &Config) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST]);

    let router = Router::new()
        .route(SNAPSHOT_ROUTE, get(show_snapshot))
        .route(WEBSOCKET_ROUTE, get(websocket::ws_handler))
        .route("/version", get(show_version));

    let router = match &config.static_dir {
        Some(dir) => {
            info!(?dir, "Serving static files");
            router.fallback(get_service(ServeDir::new(dir)).handle_error(
                |error: std::io::Error| async move {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Unhandled internal error: {error}"),
                    )
                },
            ))
        }
        None => router,
    };

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            // Every handler reads snapshots from the hub
            .layer(Extension(hub)),
    )
}

async fn run(
    config: Config,
    port: Option<u16>,
    allocated_port: Option<oneshot::Sender<u16>>,
) -> Result<(), Error> {
    config.validate()?;

    let source = start_source(&config);
    let app = app(source.hub.clone(), &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(0)));
    let server = axum::Server::try_bind(&addr)
        .map_err(|e| Error::Server(format!("Could not bind {addr}: {e}")))?
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    let addr = server.local_addr();

    if let Some(port_reply) = allocated_port {
        if port_reply.send(addr.port()).is_err() {
            warn!("Nobody wanted to know which port was allocated");
        }
    }

    info!("listening on {}", addr);

    let served = server.await;
    source.shutdown().await;

    served.map_err(|e| Error::Server(e.to_string()))
}

/// Start the server on an arbitrary available port.
/// The port allocated will be sent on the provided channel.
pub async fn run_any_port(config: Config, allocated_port: oneshot::Sender<u16>) -> Result<(), Error> {
    run(config, None, Some(allocated_port)).await
}

/// Start the server on the given port.
pub async fn run_on_port(config: Config, port: u16) -> Result<(), Error> {
    run(config, Some(port), None).await
}

async fn show_snapshot(Extension(hub): Extension<HubHandle>) -> impl IntoResponse {
    match hub.latest().await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => Err((StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
    }
}

async fn show_version() -> impl IntoResponse {
    format!("LCR Bridge v{}\n", env!("CARGO_PKG_VERSION"))
}
