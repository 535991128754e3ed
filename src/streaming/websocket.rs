// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! WebSocket endpoint for real-time streaming to dashboards

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::broadcast::{Connection, ConnectionId, SendError};
use super::keepalive::{self, Inbound, KeepaliveExit, KEEPALIVE_TIMEOUT};
use super::messages::ServerMessage;
use crate::server::AppState;

impl From<Message> for Inbound {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Inbound::Text(text.as_str().to_string()),
            Message::Close(_) => Inbound::Close,
            _ => Inbound::Other,
        }
    }
}

/// Write half of a dashboard socket. Broadcasts and keepalive replies share
/// it, one frame at a time.
pub struct WsConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsConnection {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sink: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl Connection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send_text(&self, text: String) -> Result<(), SendError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    let conn = Arc::new(WsConnection::new(sink));
    let id = conn.id();

    if let Err(e) = conn.send_text(ServerMessage::connected().to_json()).await {
        warn!("Failed to acknowledge client {}: {}", id, e);
        return;
    }
    if !state.broadcast.connect(conn.clone()) {
        warn!("Broadcast manager unavailable, dropping client {}", id);
        conn.close().await;
        return;
    }
    info!("WebSocket client {} connected", id);

    let mut inbound = stream.map(|msg| msg.map(Inbound::from));
    match keepalive::run(&mut inbound, conn.as_ref(), KEEPALIVE_TIMEOUT).await {
        KeepaliveExit::Closed => info!("WebSocket closed by client {}", id),
        KeepaliveExit::StreamEnded => debug!("WebSocket stream ended for client {}", id),
        KeepaliveExit::ReceiveError(e) => warn!("WebSocket error from {}: {}", id, e),
        KeepaliveExit::SendFailed(e) => warn!("Failed to send to {}: {}", id, e),
    }

    state.broadcast.disconnect(id);
}
