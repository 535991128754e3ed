// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Event channel: many producers, one consumer.
//!
//! Producers live on plain threads (camera loop, audio callback) and must never
//! block, so the only push operation is `try_push`. The consumer side suspends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

use super::Event;

/// Create a bounded event channel
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        EventSender {
            tx,
            dropped: dropped.clone(),
        },
        EventReceiver { rx, dropped },
    )
}

/// Producer half. Cheap to clone, one per producer thread.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Push without blocking. Returns `false` if the event was dropped.
    pub fn try_push(&self, event: Event) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Channel full, dropping {} event", event.source);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Events dropped on overflow so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half. Exactly one exists.
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventReceiver {
    /// Wait for the next event. `None` once every sender is gone.
    pub async fn pop(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take an event if one is ready; used to drain at shutdown
    pub fn try_pop(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting new events; already queued ones can still be popped
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
