// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Audio worker: noise level events from microphone blocks

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::detectors::SoundLevelMeter;
use super::traits::{detect_or_default, AudioCapture, BlockCallback, Microphone};
use super::worker::{WorkerControl, WorkerTask};
use crate::core::{Event, EventSender};

/// Stop-flag poll interval while a capture is healthy
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Average interleaved frames down to one channel
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

pub struct AudioTask {
    microphone: Box<dyn Microphone>,
    sender: EventSender,
    threshold: f64,
    backoff: Duration,
}

impl AudioTask {
    pub fn new(microphone: Box<dyn Microphone>, sender: EventSender, threshold: f64) -> Self {
        Self {
            microphone,
            sender,
            threshold,
            backoff: Duration::from_secs(1),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Per-block handler run on the capture's callback thread
    fn block_handler(&self) -> BlockCallback {
        let sender = self.sender.clone();
        let threshold = self.threshold;
        let mut meter = SoundLevelMeter;

        Box::new(move |block: &[f32]| {
            let level = detect_or_default(&mut meter, block);
            let event = Event::noise_level(level.db, threshold);
            if !sender.try_push(event) {
                trace!("Event channel full, dropped noise level {}", level.db);
            }
        })
    }

    fn open_capture(&mut self, failures: &mut u32) -> Option<Box<dyn AudioCapture>> {
        let handler = self.block_handler();
        match self.microphone.open(handler) {
            Ok(capture) => {
                info!("Audio stream opened on {}", self.microphone.name());
                *failures = 0;
                Some(capture)
            }
            Err(e) => {
                if *failures == 0 {
                    warn!("Audio device {} unavailable: {}", self.microphone.name(), e);
                } else {
                    debug!("Audio device {} still unavailable: {}", self.microphone.name(), e);
                }
                *failures += 1;
                None
            }
        }
    }
}

impl WorkerTask for AudioTask {
    fn run(&mut self, control: &WorkerControl) {
        let mut failures = 0;
        let mut capture = self.open_capture(&mut failures);

        while control.is_running() {
            match &capture {
                Some(c) if c.is_healthy() => {
                    control.sleep(POLL_INTERVAL);
                }
                Some(_) => {
                    warn!("Audio stream failed, reconnecting");
                    capture = None;
                    if control.sleep(self.backoff) {
                        capture = self.open_capture(&mut failures);
                    }
                }
                None => {
                    if control.sleep(self.backoff) {
                        capture = self.open_capture(&mut failures);
                    }
                }
            }
        }

        if capture.take().is_some() {
            info!("Audio stream closed");
        }
        info!("Audio worker stopped");
    }
}
