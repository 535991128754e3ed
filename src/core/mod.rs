// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Core engine module - event model, channel, consumer loop and supervisor

mod channel;
mod consumer;
mod engine;
mod event;

pub use channel::{event_channel, EventReceiver, EventSender};
pub use consumer::{ConsumerStats, EventConsumer};
pub use engine::Engine;
pub use event::{format_timestamp, kinds, sources, timestamp_now, Event, FieldValue, Payload};
