// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor traits and common types

use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// One RGB8 camera frame, row-major
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// Uniform frame of one color
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            width,
            height,
            pixels,
            sequence: 0,
            captured_at: Utc::now(),
        }
    }

    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    pub fn set_rgb(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels[i..i + 3].copy_from_slice(&rgb);
    }

    /// Fill an axis-aligned rectangle, clipped to the frame
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgb: [u8; 3]) {
        for yy in y..(y + h).min(self.height) {
            for xx in x..(x + w).min(self.width) {
                self.set_rgb(xx, yy, rgb);
            }
        }
    }

    /// ITU-R BT.601 luma
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        let [r, g, b] = self.rgb(x, y);
        ((299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b)) / 1000) as u8
    }
}

/// A pull-driven capture device (camera)
pub trait Device: Send {
    /// Source identifier, e.g. `cam0`
    fn id(&self) -> &str;

    fn open(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Block until the next frame is available
    fn read(&mut self) -> Result<Frame>;

    /// Release the device. Safe to call when not open.
    fn release(&mut self);
}

/// Callback receiving fixed-size blocks of mono samples
pub type BlockCallback = Box<dyn FnMut(&[f32]) + Send>;

/// A push-driven capture device (microphone)
pub trait Microphone: Send {
    fn name(&self) -> &str;

    /// Start capturing. `on_block` runs on the device's own callback thread.
    /// Capture stops when the returned handle is dropped.
    fn open(&mut self, on_block: BlockCallback) -> Result<Box<dyn AudioCapture>>;
}

/// A running audio capture
pub trait AudioCapture {
    /// `false` once the underlying stream has failed
    fn is_healthy(&self) -> bool;
}

/// Detection collaborator: a function of one input
pub trait Detector<I: ?Sized>: Send {
    type Output: Default;

    fn name(&self) -> &str;

    fn detect(&mut self, input: &I) -> Result<Self::Output>;
}

/// Run a detector, turning errors and panics into the empty result so a
/// broken detector cannot stop its worker.
pub fn detect_or_default<I, D>(detector: &mut D, input: &I) -> D::Output
where
    I: ?Sized,
    D: Detector<I> + ?Sized,
{
    match catch_unwind(AssertUnwindSafe(|| detector.detect(input))) {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!("{} failed: {}", detector.name(), e);
            D::Output::default()
        }
        Err(_) => {
            warn!("{} panicked", detector.name());
            D::Output::default()
        }
    }
}

/// People detector output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeopleCount {
    pub count: u32,
}

/// Pose/accident detector output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccidentAssessment {
    pub detected: bool,
    pub kind: Option<String>,
}

/// PPE detector output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PpeAssessment {
    pub compliant: u32,
    pub non_compliant: u32,
    pub total: u32,
    pub missing_items: Vec<String>,
}

/// Sound level meter output, dB
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SoundLevel {
    pub db: f64,
}
