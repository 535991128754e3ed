// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Streaming module - live fan-out to dashboard WebSocket clients

mod broadcast;
mod keepalive;
mod messages;
mod websocket;

pub use broadcast::{
    broadcast_control, BroadcastCommand, BroadcastControl, BroadcastHandle, BroadcastManager,
    BroadcastReport, Connection, ConnectionId, ConnectionState, SendError, SEND_TIMEOUT,
};
pub use keepalive::{run as run_keepalive, Inbound, KeepaliveExit, KEEPALIVE_TIMEOUT};
pub use messages::ServerMessage;
pub use websocket::{ws_handler, WsConnection};

#[cfg(test)]
pub(crate) use broadcast::testing;
