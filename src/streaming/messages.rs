// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Control messages sent to dashboard clients

use serde::Serialize;

use crate::core::timestamp_now;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Acknowledgment sent once when a client connects
    Connection { status: String, timestamp: String },
    Pong { timestamp: String },
    Keepalive { timestamp: String },
}

impl ServerMessage {
    pub fn connected() -> Self {
        ServerMessage::Connection {
            status: "connected".to_string(),
            timestamp: timestamp_now(),
        }
    }

    pub fn pong() -> Self {
        ServerMessage::Pong {
            timestamp: timestamp_now(),
        }
    }

    pub fn keepalive() -> Self {
        ServerMessage::Keepalive {
            timestamp: timestamp_now(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_wire_format() {
        let ack: Value = serde_json::from_str(&ServerMessage::connected().to_json()).unwrap();
        assert_eq!(ack["type"], "connection");
        assert_eq!(ack["status"], "connected");
        assert!(ack["timestamp"].as_str().unwrap().ends_with('Z'));

        let pong: Value = serde_json::from_str(&ServerMessage::pong().to_json()).unwrap();
        assert_eq!(pong["type"], "pong");

        let keepalive: Value = serde_json::from_str(&ServerMessage::keepalive().to_json()).unwrap();
        assert_eq!(keepalive["type"], "keepalive");
    }
}
