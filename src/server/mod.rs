// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! HTTP server: REST status/log/control routes and the dashboard socket

mod routes;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::db::DurableLogger;
use crate::sensors::WorkerControl;
use crate::streaming::{ws_handler, BroadcastHandle};

pub use routes::{CameraAction, LogsQuery};

#[derive(Clone)]
pub struct AppState {
    pub logger: Arc<DurableLogger>,
    pub broadcast: BroadcastHandle,
    pub camera: Arc<WorkerControl>,
    pub audio: Arc<WorkerControl>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::router())
        .route("/ws/dashboard", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
}
