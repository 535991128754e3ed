// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Simulated camera and microphone for demo mode and testing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use rand::prelude::*;
use rand_distr::StandardNormal;
use tracing::debug;

use super::traits::{AudioCapture, BlockCallback, Device, Frame, Microphone};

const FLOOR: [u8; 3] = [25, 25, 30];
const SKIN: [u8; 3] = [200, 160, 140];
const HELMET: [u8; 3] = [250, 220, 20];
const VEST: [u8; 3] = [255, 120, 0];

/// What the simulated camera is looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scene {
    /// Workers walking about; occasionally one is lying down
    Floor,
    /// Workers at a checkpoint, some without helmet or vest
    Checkpoint,
}

/// Synthetic camera drawing figures on a dark background
pub struct SimulatedCamera {
    id: String,
    scene: Scene,
    width: u32,
    height: u32,
    open: bool,
    sequence: u64,
    rng: StdRng,

    // Simulation state
    anomaly_probability: f64,
    failure_probability: f64,
}

impl SimulatedCamera {
    pub fn new(id: &str, scene: Scene) -> Self {
        Self {
            id: id.to_string(),
            scene,
            width: 160,
            height: 120,
            open: false,
            sequence: 0,
            rng: StdRng::from_entropy(),
            anomaly_probability: 0.02,
            failure_probability: 0.001,
        }
    }

    /// Deterministic frames for tests
    pub fn seeded(id: &str, scene: Scene, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            failure_probability: 0.0,
            ..Self::new(id, scene)
        }
    }

    fn draw_figure(&mut self, frame: &mut Frame, x: u32) {
        let height = self.rng.gen_range(60..90);
        let y = self.height - height - 5;
        frame.fill_rect(x, y, 12, height, SKIN);

        if self.scene == Scene::Checkpoint {
            if self.rng.gen::<f64>() > 0.2 {
                frame.fill_rect(x, y, 12, height / 5, HELMET);
            }
            if self.rng.gen::<f64>() > 0.3 {
                frame.fill_rect(x, y + height / 5, 12, height * 2 / 5, VEST);
            }
        }
    }

    fn generate_frame(&mut self) -> Frame {
        self.sequence += 1;
        let mut frame = Frame::filled(self.width, self.height, FLOOR);
        frame.sequence = self.sequence;
        frame.captured_at = Utc::now();

        let people = self.rng.gen_range(0..=3u32);
        for slot in 0..people {
            let x = 8 + slot * 50 + self.rng.gen_range(0..20);
            self.draw_figure(&mut frame, x);
        }

        if self.scene == Scene::Floor && self.rng.gen::<f64>() < self.anomaly_probability {
            let x = self.rng.gen_range(5..60);
            frame.fill_rect(x, self.height - 14, 70, 10, SKIN);
        }

        // Sensor noise
        for _ in 0..(self.width * self.height / 50) {
            let x = self.rng.gen_range(0..self.width);
            let y = self.rng.gen_range(0..self.height);
            let [r, g, b] = frame.rgb(x, y);
            let n = self.rng.sample::<f64, _>(StandardNormal) * 4.0;
            let jitter = |c: u8| (f64::from(c) + n).clamp(0.0, 255.0) as u8;
            frame.set_rgb(x, y, [jitter(r), jitter(g), jitter(b)]);
        }

        frame
    }
}

impl Device for SimulatedCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn open(&mut self) -> Result<()> {
        self.open = true;
        debug!("Simulated camera {} opened", self.id);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self) -> Result<Frame> {
        if !self.open {
            bail!("camera {} is not open", self.id);
        }
        if self.rng.gen::<f64>() < self.failure_probability {
            bail!("camera {} dropped a frame", self.id);
        }
        Ok(self.generate_frame())
    }

    fn release(&mut self) {
        self.open = false;
    }
}

/// Synthetic microphone: background hum with occasional loud machinery
pub struct SimulatedMicrophone {
    sample_rate: u32,
    chunk_size: u32,
}

impl SimulatedMicrophone {
    pub fn new(sample_rate: u32, chunk_size: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            chunk_size: chunk_size.max(1),
        }
    }
}

struct SimulatedCapture {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl AudioCapture for SimulatedCapture {
    fn is_healthy(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SimulatedCapture {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Microphone for SimulatedMicrophone {
    fn name(&self) -> &str {
        "simulated microphone"
    }

    fn open(&mut self, mut on_block: BlockCallback) -> Result<Box<dyn AudioCapture>> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let chunk = self.chunk_size as usize;
        let block_period =
            Duration::from_secs_f64(f64::from(self.chunk_size) / f64::from(self.sample_rate));

        let thread = thread::Builder::new()
            .name("sim-microphone".into())
            .spawn(move || {
                let mut rng = StdRng::from_entropy();
                let mut block = vec![0.0f32; chunk];
                let mut loud_blocks = 0u32;

                while flag.load(Ordering::Relaxed) {
                    if loud_blocks == 0 && rng.gen::<f64>() < 0.01 {
                        loud_blocks = rng.gen_range(5..30);
                    }
                    let gain = if loud_blocks > 0 {
                        loud_blocks -= 1;
                        rng.gen_range(8.0..20.0)
                    } else {
                        1.0
                    };

                    for sample in block.iter_mut() {
                        let hum = rng.sample::<f64, _>(StandardNormal) * 0.02;
                        *sample = (hum * gain).clamp(-1.0, 1.0) as f32;
                    }
                    on_block(&block);
                    thread::sleep(block_period);
                }
            })?;

        Ok(Box::new(SimulatedCapture {
            running,
            thread: Some(thread),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::detectors::{PeopleCounter, PpeDetector};
    use crate::sensors::traits::Detector;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_camera_requires_open() {
        let mut camera = SimulatedCamera::seeded("cam0", Scene::Floor, 7);
        assert!(camera.read().is_err());

        camera.open().unwrap();
        let frame = camera.read().unwrap();
        assert_eq!(frame.pixels.len(), 160 * 120 * 3);
        assert_eq!(frame.sequence, 1);

        camera.release();
        assert!(!camera.is_open());
    }

    #[test]
    fn test_frames_are_analyzable() {
        let mut camera = SimulatedCamera::seeded("cam10", Scene::Checkpoint, 42);
        camera.open().unwrap();
        let mut counter = PeopleCounter::default();
        let mut ppe = PpeDetector::default();

        for _ in 0..20 {
            let frame = camera.read().unwrap();
            let people = counter.detect(&frame).unwrap();
            let result = ppe.detect(&frame).unwrap();
            assert!(people.count <= 3);
            assert_eq!(result.compliant + result.non_compliant, result.total);
        }
    }

    #[test]
    fn test_microphone_delivers_blocks_until_dropped() {
        let blocks = Arc::new(AtomicUsize::new(0));
        let seen = blocks.clone();
        let mut mic = SimulatedMicrophone::new(8000, 80);

        let capture = mic
            .open(Box::new(move |block: &[f32]| {
                assert_eq!(block.len(), 80);
                seen.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        thread::sleep(Duration::from_millis(100));
        assert!(capture.is_healthy());
        drop(capture);

        let after_drop = blocks.load(Ordering::SeqCst);
        assert!(after_drop > 0);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(blocks.load(Ordering::SeqCst), after_drop);
    }
}
