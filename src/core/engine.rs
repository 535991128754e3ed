// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Main monitoring engine - wires workers, channel, consumer and logger

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::consumer::{ConsumerStats, EventConsumer};
use super::{event_channel, EventSender};
use crate::config::Config;
use crate::db::{DurableLogger, FlushOutcome};
use crate::sensors::SensorManager;
use crate::server::AppState;
use crate::streaming::{broadcast_control, BroadcastHandle};

/// Supervisor owning every long-lived part of the pipeline
pub struct Engine {
    pub config: Arc<Config>,
    logger: Arc<DurableLogger>,
    sensors: Arc<SensorManager>,
    sender: EventSender,
    broadcast: BroadcastHandle,
    shutdown_tx: broadcast::Sender<()>,
    consumer: Option<EventConsumer>,
    consumer_task: Option<JoinHandle<ConsumerStats>>,
    camera_enabled: bool,
    audio_enabled: bool,
    start_time: Option<Instant>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        let logger = Arc::new(DurableLogger::open(&config)?);
        let (sender, receiver) = event_channel(config.channel_capacity);
        let sensors = Arc::new(SensorManager::new(&config, sender.clone()));
        let (broadcast, control) = broadcast_control();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let consumer = EventConsumer::new(receiver, logger.clone(), control, shutdown_rx);

        Ok(Self {
            config: Arc::new(config),
            logger,
            sensors,
            sender,
            broadcast,
            shutdown_tx,
            consumer: Some(consumer),
            consumer_task: None,
            camera_enabled: true,
            audio_enabled: true,
            start_time: None,
        })
    }

    /// Choose which workers `start` launches
    pub fn with_sensors(mut self, camera: bool, audio: bool) -> Self {
        self.camera_enabled = camera;
        self.audio_enabled = audio;
        self
    }

    /// Spawn the consumer and start the enabled workers. Must run inside a
    /// tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        info!("Starting monitoring engine...");

        if let Some(consumer) = self.consumer.take() {
            self.consumer_task = Some(tokio::spawn(consumer.run()));
        }

        if self.camera_enabled {
            self.sensors.start_camera()?;
        } else {
            info!("Camera monitoring disabled");
        }
        if self.audio_enabled {
            self.sensors.start_audio()?;
        } else {
            info!("Audio monitoring disabled");
        }

        self.start_time = Some(Instant::now());
        info!("Monitoring engine started");
        Ok(())
    }

    /// Ordered shutdown: workers, then consumer drain, then final flush
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down...");

        self.sensors.stop_all();
        let sensors = self.sensors.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || sensors.join_all()).await {
            error!("Failed to join sensing workers: {}", e);
        }

        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.consumer_task.take() {
            match task.await {
                Ok(stats) => info!(
                    "Consumer finished: {} processed, {} drained",
                    stats.processed, stats.drained
                ),
                Err(e) => error!("Consumer task failed: {}", e),
            }
        }
        self.consumer = None;

        let dropped = self.sender.dropped();
        if dropped > 0 {
            warn!("{} events were dropped on a full channel", dropped);
        }

        let logger = self.logger.clone();
        match tokio::task::spawn_blocking(move || logger.close()).await? {
            Ok(FlushOutcome::Fallback(n)) => warn!("Final {} events written to CSV fallback", n),
            Ok(_) => {}
            Err(e) => error!("Final flush failed: {}", e),
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Shared state for the HTTP server
    pub fn app_state(&self) -> AppState {
        AppState {
            logger: self.logger.clone(),
            broadcast: self.broadcast.clone(),
            camera: self.sensors.camera().control(),
            audio: self.sensors.audio().control(),
        }
    }

    pub fn logger(&self) -> &Arc<DurableLogger> {
        &self.logger
    }

    pub fn sensors(&self) -> &SensorManager {
        &self.sensors
    }

    /// Producer handle for injecting events
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }
}
