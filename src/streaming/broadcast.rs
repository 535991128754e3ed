// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Live connection set and event fan-out
//!
//! The [`BroadcastManager`] has exactly one owner, the consumer task. Socket
//! handlers on other tasks register and remove connections through a
//! [`BroadcastHandle`], which also exposes the live count.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::Event;

/// Default bound on a single send
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub type ConnectionId = Uuid;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// A client that can receive text frames
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    async fn send_text(&self, text: String) -> Result<(), SendError>;

    /// Best-effort close
    async fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnecting,
}

struct Entry {
    conn: Arc<dyn Connection>,
    state: ConnectionState,
}

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: usize,
}

pub struct BroadcastManager {
    connections: Vec<Entry>,
    send_timeout: Duration,
}

impl BroadcastManager {
    pub fn new() -> Self {
        Self::with_send_timeout(SEND_TIMEOUT)
    }

    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            connections: Vec::new(),
            send_timeout,
        }
    }

    /// Add a connection. Returns `false` if it was already present.
    pub fn connect(&mut self, conn: Arc<dyn Connection>) -> bool {
        let id = conn.id();
        if self.connections.iter().any(|e| e.conn.id() == id) {
            return false;
        }
        self.connections.push(Entry {
            conn,
            state: ConnectionState::Connected,
        });
        info!("Client {} connected. Total clients: {}", id, self.len());
        true
    }

    /// Remove a connection. Returns `false` if it was not present.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        let before = self.connections.len();
        self.connections.retain(|e| e.conn.id() != id);
        let removed = self.connections.len() != before;
        if removed {
            info!("Client {} disconnected. Total clients: {}", id, self.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.iter().any(|e| e.conn.id() == id)
    }

    pub fn state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.connections
            .iter()
            .find(|e| e.conn.id() == id)
            .map(|e| e.state)
    }

    /// Send `event` to every live connection concurrently. Connections whose
    /// send fails or times out are evicted after the pass.
    pub async fn broadcast(&mut self, event: &Event) -> Result<BroadcastReport, serde_json::Error> {
        if self.connections.is_empty() {
            return Ok(BroadcastReport::default());
        }

        let text = serde_json::to_string(event)?;
        let limit = self.send_timeout;
        let snapshot: Vec<Arc<dyn Connection>> =
            self.connections.iter().map(|e| e.conn.clone()).collect();

        let sends = snapshot.into_iter().map(|conn| {
            let text = text.clone();
            async move {
                let result = match timeout(limit, conn.send_text(text)).await {
                    Ok(result) => result,
                    Err(_) => Err(SendError::Timeout(limit)),
                };
                (conn.id(), result)
            }
        });

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (id, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Error sending to client {}: {}", id, e);
                    failed.push(id);
                }
            }
        }

        for entry in self.connections.iter_mut() {
            if failed.contains(&entry.conn.id()) {
                entry.state = ConnectionState::Disconnecting;
            }
        }
        let evicted: Vec<Arc<dyn Connection>> = self
            .connections
            .iter()
            .filter(|e| e.state == ConnectionState::Disconnecting)
            .map(|e| e.conn.clone())
            .collect();
        self.connections
            .retain(|e| e.state == ConnectionState::Connected);

        report.evicted = evicted.len();
        if report.evicted > 0 {
            self.close_each(evicted).await;
            info!("Evicted {} clients. Total clients: {}", report.evicted, self.len());
        }

        debug!("Broadcast {} to {} clients", event.kind, report.delivered);
        Ok(report)
    }

    /// Close and forget every connection
    pub async fn close_all(&mut self) {
        let all: Vec<Arc<dyn Connection>> = self.connections.drain(..).map(|e| e.conn).collect();
        if !all.is_empty() {
            info!("Closing {} client connections", all.len());
            self.close_each(all).await;
        }
    }

    async fn close_each(&self, conns: Vec<Arc<dyn Connection>>) {
        let limit = self.send_timeout;
        join_all(conns.iter().map(|c| async move {
            if timeout(limit, c.close()).await.is_err() {
                debug!("Close of client {} timed out", c.id());
            }
        }))
        .await;
    }
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests from socket handlers to the manager's owner
pub enum BroadcastCommand {
    Connect(Arc<dyn Connection>),
    Disconnect(ConnectionId),
}

/// Cloneable front for tasks that do not own the manager
#[derive(Clone)]
pub struct BroadcastHandle {
    commands: mpsc::UnboundedSender<BroadcastCommand>,
    count: watch::Receiver<usize>,
}

impl BroadcastHandle {
    /// Returns `false` once the owner has gone away
    pub fn connect(&self, conn: Arc<dyn Connection>) -> bool {
        self.commands.send(BroadcastCommand::Connect(conn)).is_ok()
    }

    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.commands.send(BroadcastCommand::Disconnect(id)).is_ok()
    }

    /// Live connection count as last published by the owner
    pub fn connected_clients(&self) -> usize {
        *self.count.borrow()
    }
}

/// Owner side of a [`BroadcastHandle`]
pub struct BroadcastControl {
    commands: mpsc::UnboundedReceiver<BroadcastCommand>,
    count: watch::Sender<usize>,
}

impl BroadcastControl {
    pub async fn recv(&mut self) -> Option<BroadcastCommand> {
        self.commands.recv().await
    }

    /// Next queued command without waiting
    pub fn try_recv(&mut self) -> Option<BroadcastCommand> {
        self.commands.try_recv().ok()
    }

    /// Refuse further commands. Queued ones stay readable with `try_recv`.
    pub fn close(&mut self) {
        self.commands.close();
    }

    /// Apply one command and publish the resulting count
    pub fn apply(&self, manager: &mut BroadcastManager, command: BroadcastCommand) {
        match command {
            BroadcastCommand::Connect(conn) => {
                manager.connect(conn);
            }
            BroadcastCommand::Disconnect(id) => {
                manager.disconnect(id);
            }
        }
        self.publish(manager.len());
    }

    pub fn publish(&self, count: usize) {
        self.count.send_replace(count);
    }
}

pub fn broadcast_control() -> (BroadcastHandle, BroadcastControl) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (count_tx, count_rx) = watch::channel(0);
    (
        BroadcastHandle {
            commands: tx,
            count: count_rx,
        },
        BroadcastControl {
            commands: rx,
            count: count_tx,
        },
    )
}


#[cfg(test)]
mod tests {
    use super::testing::{Behavior, RecordingConnection};
    use super::*;

    #[tokio::test]
    async fn test_connect_disconnect_idempotent() {
        let mut manager = BroadcastManager::new();
        let conn = RecordingConnection::new(Behavior::Accept);

        assert!(manager.connect(conn.clone()));
        assert!(!manager.connect(conn.clone()));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.state(conn.id()), Some(ConnectionState::Connected));

        assert!(manager.disconnect(conn.id()));
        assert!(!manager.disconnect(conn.id()));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_all() {
        let mut manager = BroadcastManager::new();
        let a = RecordingConnection::new(Behavior::Accept);
        let b = RecordingConnection::new(Behavior::Accept);
        manager.connect(a.clone());
        manager.connect(b.clone());

        let event = Event::noise_level(90.0, 85.0);
        let report = manager.broadcast(&event).await.unwrap();

        assert_eq!(report, BroadcastReport { delivered: 2, evicted: 0 });
        let sent: serde_json::Value = serde_json::from_str(&a.sent()[0]).unwrap();
        assert_eq!(sent["type"], "noise_level");
        assert_eq!(sent["alert"], true);
        assert_eq!(a.sent(), b.sent());
    }

    #[tokio::test]
    async fn test_failing_connection_evicted() {
        let mut manager = BroadcastManager::new();
        let good = RecordingConnection::new(Behavior::Accept);
        let bad = RecordingConnection::new(Behavior::Fail);
        let other = RecordingConnection::new(Behavior::Accept);
        manager.connect(good.clone());
        manager.connect(bad.clone());
        manager.connect(other.clone());

        let report = manager.broadcast(&Event::noise_level(70.0, 85.0)).await.unwrap();

        assert_eq!(report, BroadcastReport { delivered: 2, evicted: 1 });
        assert_eq!(manager.len(), 2);
        assert!(!manager.contains(bad.id()));
        assert!(bad.is_closed());
        assert_eq!(good.sent().len(), 1);
        assert_eq!(other.sent().len(), 1);

        let report = manager.broadcast(&Event::noise_level(70.0, 85.0)).await.unwrap();
        assert_eq!(report, BroadcastReport { delivered: 2, evicted: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_connection_times_out() {
        let mut manager = BroadcastManager::with_send_timeout(Duration::from_millis(50));
        let fast = RecordingConnection::new(Behavior::Accept);
        let stuck = RecordingConnection::new(Behavior::Hang);
        manager.connect(fast.clone());
        manager.connect(stuck.clone());

        let report = manager.broadcast(&Event::noise_level(70.0, 85.0)).await.unwrap();

        assert_eq!(report, BroadcastReport { delivered: 1, evicted: 1 });
        assert_eq!(fast.sent().len(), 1);
        assert!(!manager.contains(stuck.id()));
    }

    #[tokio::test]
    async fn test_handle_commands_publish_count() {
        let (handle, mut control) = broadcast_control();
        let mut manager = BroadcastManager::new();
        let conn = RecordingConnection::new(Behavior::Accept);

        assert!(handle.connect(conn.clone()));
        let command = control.recv().await.unwrap();
        control.apply(&mut manager, command);
        assert_eq!(handle.connected_clients(), 1);

        handle.disconnect(conn.id());
        handle.disconnect(conn.id());
        for _ in 0..2 {
            let command = control.recv().await.unwrap();
            control.apply(&mut manager, command);
        }
        assert_eq!(handle.connected_clients(), 0);

        drop(control);
        assert!(!handle.connect(conn));
    }

    #[tokio::test]
    async fn test_close_all() {
        let mut manager = BroadcastManager::new();
        let a = RecordingConnection::new(Behavior::Accept);
        manager.connect(a.clone());

        manager.close_all().await;
        assert!(manager.is_empty());
        assert!(a.is_closed());
    }
}
