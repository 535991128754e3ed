// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Event consumer: the single task between the channel and the sinks
//!
//! Every event is stamped, handed to the durable logger and broadcast to the
//! live connections, in receive order. The loop outlives any downstream
//! failure and only ends on the shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{Event, EventReceiver};
use crate::db::{DurableLogger, LoggerError};
use crate::streaming::{BroadcastControl, BroadcastManager, BroadcastReport};

/// Pause after a failed event
const ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Housekeeping period for time-based flushes
const FLUSH_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
enum ProcessError {
    #[error("logging failed: {0}")]
    Log(#[from] LoggerError),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Counters reported when the consumer exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub processed: u64,
    pub malformed: u64,
    pub failed: u64,
    pub drained: u64,
}

pub struct EventConsumer {
    events: EventReceiver,
    logger: Arc<DurableLogger>,
    manager: BroadcastManager,
    control: BroadcastControl,
    shutdown: broadcast::Receiver<()>,
    stats: ConsumerStats,
}

impl EventConsumer {
    pub fn new(
        events: EventReceiver,
        logger: Arc<DurableLogger>,
        control: BroadcastControl,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            events,
            logger,
            manager: BroadcastManager::new(),
            control,
            shutdown,
            stats: ConsumerStats::default(),
        }
    }

    pub fn with_manager(mut self, manager: BroadcastManager) -> Self {
        self.manager = manager;
        self
    }

    /// Run until shutdown is signalled, then drain and close connections
    pub async fn run(mut self) -> ConsumerStats {
        info!("Event consumer started");

        let mut tick = interval(FLUSH_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut producers_open = true;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.recv() => break,

                Some(command) = self.control.recv() => {
                    self.control.apply(&mut self.manager, command);
                }

                event = self.events.pop(), if producers_open => match event {
                    Some(event) => {
                        if let Err(e) = self.process(event).await {
                            self.stats.failed += 1;
                            error!("Error processing event: {}", e);
                            tokio::time::sleep(ERROR_PAUSE).await;
                        }
                    }
                    None => {
                        info!("All event producers have stopped");
                        producers_open = false;
                    }
                },

                _ = tick.tick() => {
                    if let Err(e) = self.logger.flush_if_due() {
                        error!("Scheduled flush failed: {}", e);
                    }
                }
            }
        }

        self.finish().await
    }

    async fn process(&mut self, mut event: Event) -> Result<BroadcastReport, ProcessError> {
        if !event.is_well_formed() {
            self.stats.malformed += 1;
            warn!("Dropping event without source or type");
            return Ok(BroadcastReport::default());
        }
        event.stamp_if_missing(Utc::now());

        self.logger.log_event(event.clone())?;
        let report = self.manager.broadcast(&event).await?;
        if report.evicted > 0 {
            self.control.publish(self.manager.len());
        }

        self.stats.processed += 1;
        debug!("Processed {} event from {}", event.kind, event.source);
        Ok(report)
    }

    /// Log what is still queued without broadcasting it, then close clients
    async fn finish(mut self) -> ConsumerStats {
        self.events.close();
        let now = Utc::now();
        while let Some(mut event) = self.events.try_pop() {
            if !event.is_well_formed() {
                self.stats.malformed += 1;
                continue;
            }
            event.stamp_if_missing(now);
            match self.logger.log_event(event) {
                Ok(()) => self.stats.drained += 1,
                Err(e) => {
                    self.stats.failed += 1;
                    error!("Failed to log drained event: {}", e);
                }
            }
        }
        if self.stats.drained > 0 {
            info!("Drained {} queued events", self.stats.drained);
        }

        // Connections still queued when shutdown fired must be closed too
        self.control.close();
        while let Some(command) = self.control.try_recv() {
            self.control.apply(&mut self.manager, command);
        }

        self.manager.close_all().await;
        self.control.publish(0);

        info!(
            "Event consumer stopped ({} processed, {} failed)",
            self.stats.processed, self.stats.failed
        );
        self.stats
    }
}
