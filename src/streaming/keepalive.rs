// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Per-connection keepalive: answer `ping`, send `keepalive` on silence

use std::fmt::Display;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::time::timeout;
use tracing::debug;

use super::broadcast::{Connection, SendError};
use super::messages::ServerMessage;

/// Inbound silence after which a keepalive is sent
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Inbound frame, reduced to what the protocol cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Close,
    Other,
}

/// Why the protocol ended
#[derive(Debug)]
pub enum KeepaliveExit {
    Closed,
    StreamEnded,
    ReceiveError(String),
    SendFailed(SendError),
}

/// Run until the client goes away. Outbound control messages go through
/// `conn`, the same path broadcasts use.
pub async fn run<S, E>(inbound: &mut S, conn: &dyn Connection, silence: Duration) -> KeepaliveExit
where
    S: Stream<Item = Result<Inbound, E>> + Unpin,
    E: Display,
{
    loop {
        let reply = match timeout(silence, inbound.next()).await {
            Err(_) => ServerMessage::keepalive(),
            Ok(None) => return KeepaliveExit::StreamEnded,
            Ok(Some(Err(e))) => return KeepaliveExit::ReceiveError(e.to_string()),
            Ok(Some(Ok(Inbound::Close))) => return KeepaliveExit::Closed,
            Ok(Some(Ok(Inbound::Text(text)))) if text == "ping" => ServerMessage::pong(),
            Ok(Some(Ok(other))) => {
                debug!("Ignoring message from client {}: {:?}", conn.id(), other);
                continue;
            }
        };

        if let Err(e) = conn.send_text(reply.to_json()).await {
            return KeepaliveExit::SendFailed(e);
        }
    }
}
