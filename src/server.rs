use std::{net::SocketAddr, time::Duration};

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    error::Error,
    restart,
    state::{RuntimeState, StateStore},
    websocket,
};

/// The default port to run the status API on.
pub const DEFAULT_PORT: u16 = 5000;

/// Give the restart response a moment to reach the client before the process goes away.
const RESTART_DELAY: Duration = Duration::from_millis(200);

/// The status API routes.
pub fn app(config: Config, store: StateStore) -> Router {
    Router::new()
        .route("/status", get(show_status))
        .route("/ws", get(websocket::ws_handler))
        .route("/restart", post(request_restart))
        .route("/config", get(show_config))
        .route("/version", get(show_version))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // Each websocket needs to be able to reach the state
                .layer(Extension(store))
                // The bridge config should be known to the web server
                .layer(Extension(config)),
        )
}

async fn run(
    app: Router,
    port: Option<u16>,
    allocated_port: Option<oneshot::Sender<u16>>,
) -> Result<(), Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(0)));
    let server = axum::Server::try_bind(&addr)
        .map_err(|e| Error::Http(format!("Could not bind {addr}: {e}")))?
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    let addr = server.local_addr();

    if let Some(port_reply) = allocated_port {
        if port_reply.send(addr.port()).is_err() {
            warn!("Nobody wanted to know the allocated API port");
        }
    }

    info!("API listening on {}", addr);

    server.await.map_err(|e| Error::Http(e.to_string()))
}

/// Start the API on an arbitrary available port.
/// The port allocated will be sent on the provided channel.
pub async fn run_any_port(app: Router, allocated_port: oneshot::Sender<u16>) -> Result<(), Error> {
    run(app, None, Some(allocated_port)).await
}

/// Start the API on the given port.
pub async fn run_on_port(app: Router, port: u16) -> Result<(), Error> {
    run(app, Some(port), None).await
}

async fn show_status(Extension(store): Extension<StateStore>) -> Json<RuntimeState> {
    Json(store.snapshot().await)
}

async fn request_restart() -> impl IntoResponse {
    info!("Restart requested via API");

    tokio::spawn(async {
        tokio::time::sleep(RESTART_DELAY).await;

        let Err(e) = restart::reexec();
        error!(%e, "Restart failed");
    });

    StatusCode::ACCEPTED
}

async fn show_config(Extension(config): Extension<Config>) -> impl IntoResponse {
    match config.serialize_pretty() {
        Ok(config) => (StatusCode::OK, config),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn show_version() -> impl IntoResponse {
    format!("GRBL Bridge v{}\n", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn status_is_current_snapshot() {
        let store = StateStore::new(RuntimeState::new("/dev/ttyTest", false));
        store.update(|state| state.client_connected = true).await;

        let Json(status) = show_status(Extension(store.clone())).await;

        assert_eq!(status, store.snapshot().await);
        assert!(status.client_connected);
    }

    #[tokio::test]
    async fn config_is_served_as_ron() {
        let response = show_config(Extension(Config::example()))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
