// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! SiteWatch - real-time workplace safety monitoring
//!
//! Camera and audio workers turn raw frames and sound blocks into safety
//! events. A single consumer stamps each event, writes it through the
//! durable logger and fans it out to connected dashboards.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   try_push   ┌───────────────┐   ┌────────────────────┐
//! │ Camera worker│ ───────────→ │               │   │ Durable logger     │
//! ├──────────────┤              │ Event channel │ → │ SQLite / CSV       │
//! │ Audio worker │ ───────────→ │   (bounded)   │   ├────────────────────┤
//! └──────────────┘              └───────────────┘   │ Broadcast manager  │
//!                                  Event consumer   │ WebSocket clients  │
//!                                                   └────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod db;
pub mod sensors;
pub mod server;
pub mod streaming;

pub use config::Config;
pub use core::{Engine, Event, EventSender};
pub use db::DurableLogger;
pub use sensors::SensorManager;
pub use server::AppState;
pub use streaming::BroadcastManager;

/// SiteWatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SiteWatch name
pub const NAME: &str = "SiteWatch";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        features: enabled_features(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: String,
    pub target: String,
    pub os: String,
    pub features: Vec<String>,
}

fn enabled_features() -> Vec<String> {
    [("audio", cfg!(feature = "audio"))]
        .into_iter()
        .filter(|(_, enabled)| *enabled)
        .map(|(name, _)| name.to_string())
        .collect()
}
