// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Camera worker: polls every camera channel once per period

use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use super::detectors::{PeopleCounter, PostureDetector, PpeDetector};
use super::traits::{
    detect_or_default, AccidentAssessment, Detector, Device, Frame, PeopleCount, PpeAssessment,
};
use super::worker::{WorkerControl, WorkerTask};
use crate::config::Config;
use crate::core::{Event, EventSender};

/// Frames per second, recomputed once per elapsed second
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window_start: Instant,
    frames: u32,
    fps: f64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }

    /// Count one frame and return the current rate, two decimals
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f64 {
        self.frames += 1;
        let elapsed = now.duration_since(self.window_start).as_secs_f64();
        if elapsed >= 1.0 {
            self.fps = f64::from(self.frames) / elapsed;
            self.frames = 0;
            self.window_start = now;
        }
        (self.fps * 100.0).round() / 100.0
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns one frame into one event
pub trait FrameAnalyzer: Send {
    fn analyze(&mut self, frame: &Frame, fps: f64) -> Event;
}

type PeopleDetector = Box<dyn Detector<Frame, Output = PeopleCount>>;
type AccidentDetector = Box<dyn Detector<Frame, Output = AccidentAssessment>>;
type ComplianceDetector = Box<dyn Detector<Frame, Output = PpeAssessment>>;

/// cam0: people count and optional accident assessment
pub struct PeopleAnalyzer {
    people: PeopleDetector,
    accident: Option<AccidentDetector>,
}

impl PeopleAnalyzer {
    pub fn new(people: PeopleDetector, accident: Option<AccidentDetector>) -> Self {
        Self { people, accident }
    }
}

impl FrameAnalyzer for PeopleAnalyzer {
    fn analyze(&mut self, frame: &Frame, fps: f64) -> Event {
        let people = detect_or_default(self.people.as_mut(), frame);
        let accident = self
            .accident
            .as_mut()
            .map(|d| detect_or_default(d.as_mut(), frame))
            .unwrap_or_default();

        if accident.detected {
            warn!("Accident detected on frame {}: {:?}", frame.sequence, accident.kind);
        }
        Event::people_detection(people.count, accident.detected, accident.kind, fps)
    }
}

/// cam10: PPE compliance, zeros when disabled
pub struct PpeAnalyzer {
    ppe: Option<ComplianceDetector>,
}

impl PpeAnalyzer {
    pub fn new(ppe: Option<ComplianceDetector>) -> Self {
        Self { ppe }
    }
}

impl FrameAnalyzer for PpeAnalyzer {
    fn analyze(&mut self, frame: &Frame, fps: f64) -> Event {
        let result = self
            .ppe
            .as_mut()
            .map(|d| detect_or_default(d.as_mut(), frame))
            .unwrap_or_default();

        Event::ppe_detection(
            result.compliant,
            result.non_compliant,
            result.total,
            result.missing_items,
            fps,
        )
    }
}

/// One device with its analyzer
pub struct CameraChannel {
    device: Box<dyn Device>,
    analyzer: Box<dyn FrameAnalyzer>,
    fps: FpsCounter,
    enabled: bool,
}

impl CameraChannel {
    pub fn new(device: Box<dyn Device>, analyzer: Box<dyn FrameAnalyzer>) -> Self {
        Self {
            device,
            analyzer,
            fps: FpsCounter::new(),
            enabled: false,
        }
    }
}

pub struct CameraTask {
    channels: Vec<CameraChannel>,
    sender: EventSender,
    period: Duration,
    backoff: Duration,
}

impl CameraTask {
    pub fn new(channels: Vec<CameraChannel>, sender: EventSender, period: Duration) -> Self {
        Self {
            channels,
            sender,
            period,
            backoff: Duration::from_secs(1),
        }
    }

    /// cam0 (people, accident) and cam10 (PPE) wired per the configuration
    pub fn from_config(
        config: &Config,
        sender: EventSender,
        cam0: Box<dyn Device>,
        cam10: Box<dyn Device>,
    ) -> Self {
        let accident: Option<AccidentDetector> = config
            .accident_detection_enabled
            .then(|| Box::new(PostureDetector::default()) as AccidentDetector);
        let ppe: Option<ComplianceDetector> = config
            .ppe_detection_enabled
            .then(|| Box::new(PpeDetector::new(config.detection_confidence)) as ComplianceDetector);

        let channels = vec![
            CameraChannel::new(
                cam0,
                Box::new(PeopleAnalyzer::new(Box::new(PeopleCounter::default()), accident)),
            ),
            CameraChannel::new(cam10, Box::new(PpeAnalyzer::new(ppe))),
        ];

        Self::new(channels, sender, config.camera_period())
    }

    /// Delay before re-opening a failed device
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn open_all(&mut self) -> usize {
        for channel in &mut self.channels {
            channel.enabled = match channel.device.open() {
                Ok(()) => {
                    info!("Camera {} opened", channel.device.id());
                    true
                }
                Err(e) => {
                    warn!("Camera {} could not be opened: {}", channel.device.id(), e);
                    false
                }
            };
            channel.fps = FpsCounter::new();
        }
        self.channels.iter().filter(|c| c.enabled).count()
    }

    fn release_all(&mut self) {
        for channel in &mut self.channels {
            channel.device.release();
        }
    }
}

impl WorkerTask for CameraTask {
    fn run(&mut self, control: &WorkerControl) {
        if self.open_all() == 0 {
            error!("No cameras available. Camera worker stopping.");
            self.release_all();
            return;
        }
        info!("Camera worker loop started");

        while control.is_running() {
            let started = Instant::now();

            for channel in self.channels.iter_mut().filter(|c| c.enabled) {
                if !control.is_running() {
                    break;
                }

                let id = channel.device.id().to_string();
                if !channel.device.is_open() {
                    if control.sleep(self.backoff) {
                        if let Err(e) = channel.device.open() {
                            debug!("Camera {} still unavailable: {}", id, e);
                        }
                    }
                    continue;
                }

                match channel.device.read() {
                    Ok(frame) => {
                        let fps = channel.fps.tick();
                        let event = channel.analyzer.analyze(&frame, fps);
                        if !self.sender.try_push(event) {
                            trace!("Event channel full, dropped {} frame {}", id, frame.sequence);
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read from {}: {}", id, e);
                        if !control.sleep(self.backoff) {
                            break;
                        }
                        channel.device.release();
                        match channel.device.open() {
                            Ok(()) => info!("Camera {} reconnected", id),
                            Err(e) => warn!("Camera {} reconnect failed: {}", id, e),
                        }
                    }
                }
            }

            if let Some(rest) = self.period.checked_sub(started.elapsed()) {
                control.sleep(rest);
            }
        }

        self.release_all();
        info!("Camera worker stopped");
    }
}
