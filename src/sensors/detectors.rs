// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Frame heuristics and the sound level meter
//!
//! Figures are segmented from a dark background by luma. Each figure is a run
//! of occupied columns; its bounding box drives posture and PPE checks.

use anyhow::{bail, Result};

use super::traits::{AccidentAssessment, Detector, Frame, PeopleCount, PpeAssessment, SoundLevel};

/// Pixels brighter than this belong to a figure
const FOREGROUND_LUMA: u8 = 60;

/// Width/height ratio above which a figure is lying down
const FALL_ASPECT_RATIO: f64 = 2.5;

/// A figure's bounding box in pixels, inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x0: u32,
    pub x1: u32,
    pub y0: u32,
    pub y1: u32,
}

impl Region {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0 + 1
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0 + 1
    }
}

/// Segment foreground figures. A column is occupied when it holds at least
/// `min_column_fill` foreground pixels; runs narrower than `min_width` are noise.
pub fn find_regions(frame: &Frame, min_width: u32, min_column_fill: u32) -> Vec<Region> {
    let mut regions = Vec::new();
    let mut run: Option<Region> = None;

    for x in 0..frame.width {
        let rows: Vec<u32> = (0..frame.height)
            .filter(|&y| frame.luma(x, y) > FOREGROUND_LUMA)
            .collect();

        let occupied = rows.len() as u32 >= min_column_fill.max(1);
        match (occupied, run.as_mut()) {
            (true, Some(r)) => {
                r.x1 = x;
                r.y0 = r.y0.min(rows[0]);
                r.y1 = r.y1.max(rows[rows.len() - 1]);
            }
            (true, None) => {
                run = Some(Region {
                    x0: x,
                    x1: x,
                    y0: rows[0],
                    y1: rows[rows.len() - 1],
                });
            }
            (false, _) => {
                if let Some(r) = run.take() {
                    if r.width() >= min_width {
                        regions.push(r);
                    }
                }
            }
        }
    }

    if let Some(r) = run {
        if r.width() >= min_width {
            regions.push(r);
        }
    }
    regions
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.pixels.len() != expected {
        bail!(
            "frame {} has {} bytes, expected {}",
            frame.sequence,
            frame.pixels.len(),
            expected
        );
    }
    Ok(())
}

/// Counts foreground figures
#[derive(Debug, Clone)]
pub struct PeopleCounter {
    min_width: u32,
}

impl PeopleCounter {
    pub fn new(min_width: u32) -> Self {
        Self { min_width }
    }
}

impl Default for PeopleCounter {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Detector<Frame> for PeopleCounter {
    type Output = PeopleCount;

    fn name(&self) -> &str {
        "people counter"
    }

    fn detect(&mut self, frame: &Frame) -> Result<PeopleCount> {
        check_frame(frame)?;
        let count = find_regions(frame, self.min_width, 2).len() as u32;
        Ok(PeopleCount { count })
    }
}

/// Flags figures lying down
#[derive(Debug, Clone)]
pub struct PostureDetector {
    min_width: u32,
}

impl Default for PostureDetector {
    fn default() -> Self {
        Self { min_width: 4 }
    }
}

impl Detector<Frame> for PostureDetector {
    type Output = AccidentAssessment;

    fn name(&self) -> &str {
        "posture detector"
    }

    fn detect(&mut self, frame: &Frame) -> Result<AccidentAssessment> {
        check_frame(frame)?;
        let fallen = find_regions(frame, self.min_width, 1).iter().any(|r| {
            f64::from(r.width()) / f64::from(r.height()) > FALL_ASPECT_RATIO
        });

        Ok(if fallen {
            AccidentAssessment {
                detected: true,
                kind: Some("fall_detected".to_string()),
            }
        } else {
            AccidentAssessment::default()
        })
    }
}

/// Hue/saturation/value with hue in degrees
fn hsv([r, g, b]: [u8; 3]) -> (f64, f64, f64) {
    let (r, g, b) = (f64::from(r) / 255.0, f64::from(g) / 255.0, f64::from(b) / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };
    (hue, saturation, max)
}

fn is_helmet_color(rgb: [u8; 3]) -> bool {
    let (h, s, v) = hsv(rgb);
    let yellow = (40.0..=70.0).contains(&h) && s > 0.4 && v > 0.4;
    let white = s < 0.15 && v > 0.85;
    yellow || white
}

fn is_vest_color(rgb: [u8; 3]) -> bool {
    let (h, s, v) = hsv(rgb);
    (10.0..=70.0).contains(&h) && s > 0.5 && v > 0.4
}

/// Helmet and high-visibility vest check per figure
#[derive(Debug, Clone)]
pub struct PpeDetector {
    min_width: u32,
    min_coverage: f64,
}

impl PpeDetector {
    /// `confidence` in 0..=1 scales the share of a body zone that must show
    /// the PPE color.
    pub fn new(confidence: f64) -> Self {
        Self {
            min_width: 4,
            min_coverage: confidence.clamp(0.0, 1.0) * 0.5,
        }
    }

    fn coverage(
        frame: &Frame,
        region: &Region,
        rows: (u32, u32),
        matches: fn([u8; 3]) -> bool,
    ) -> f64 {
        let (y0, y1) = rows;
        let mut hits = 0u32;
        let mut total = 0u32;
        for y in y0..=y1 {
            for x in region.x0..=region.x1 {
                total += 1;
                if matches(frame.rgb(x, y)) {
                    hits += 1;
                }
            }
        }
        if total == 0 {
            0.0
        } else {
            f64::from(hits) / f64::from(total)
        }
    }
}

impl Default for PpeDetector {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Detector<Frame> for PpeDetector {
    type Output = PpeAssessment;

    fn name(&self) -> &str {
        "ppe detector"
    }

    fn detect(&mut self, frame: &Frame) -> Result<PpeAssessment> {
        check_frame(frame)?;
        let mut assessment = PpeAssessment::default();

        for region in find_regions(frame, self.min_width, 2) {
            let band = (region.height() / 5).max(1);
            let head = (region.y0, (region.y0 + band - 1).min(region.y1));
            let torso = (
                (region.y0 + band).min(region.y1),
                (region.y0 + 3 * band).min(region.y1),
            );

            let mut missing = Vec::new();
            if Self::coverage(frame, &region, head, is_helmet_color) < self.min_coverage {
                missing.push("helmet");
            }
            if Self::coverage(frame, &region, torso, is_vest_color) < self.min_coverage {
                missing.push("vest");
            }

            assessment.total += 1;
            if missing.is_empty() {
                assessment.compliant += 1;
            } else {
                assessment.non_compliant += 1;
                for item in missing {
                    if !assessment.missing_items.iter().any(|m| m == item) {
                        assessment.missing_items.push(item.to_string());
                    }
                }
            }
        }

        Ok(assessment)
    }
}

/// Sound pressure estimate from one block of samples in [-1, 1]:
/// RMS in dBFS shifted by +100, clamped to 0..=120, one decimal.
pub fn calculate_db(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_square =
        samples.iter().map(|s| f64::from(*s).powi(2)).sum::<f64>() / samples.len() as f64;
    let rms = mean_square.sqrt();
    if rms <= 0.0 {
        return 0.0;
    }
    let db = (20.0 * rms.log10() + 100.0).clamp(0.0, 120.0);
    (db * 10.0).round() / 10.0
}

/// Decibel meter over audio blocks
#[derive(Debug, Clone, Default)]
pub struct SoundLevelMeter;

impl Detector<[f32]> for SoundLevelMeter {
    type Output = SoundLevel;

    fn name(&self) -> &str {
        "sound level meter"
    }

    fn detect(&mut self, samples: &[f32]) -> Result<SoundLevel> {
        if samples.iter().any(|s| !s.is_finite()) {
            bail!("non-finite sample in block");
        }
        Ok(SoundLevel {
            db: calculate_db(samples),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKIN: [u8; 3] = [200, 160, 140];
    const HELMET: [u8; 3] = [250, 220, 20];
    const VEST: [u8; 3] = [255, 120, 0];

    fn scene() -> Frame {
        Frame::filled(64, 48, [10, 10, 10])
    }

    fn worker(frame: &mut Frame, x: u32, helmet: bool, vest: bool) {
        frame.fill_rect(x, 5, 8, 40, SKIN);
        if helmet {
            frame.fill_rect(x, 5, 8, 8, HELMET);
        }
        if vest {
            frame.fill_rect(x, 13, 8, 16, VEST);
        }
    }

    #[test]
    fn test_counts_standing_figures() {
        let mut frame = scene();
        worker(&mut frame, 5, false, false);
        worker(&mut frame, 25, false, false);
        worker(&mut frame, 45, false, false);

        let mut counter = PeopleCounter::default();
        assert_eq!(counter.detect(&frame).unwrap().count, 3);

        let mut posture = PostureDetector::default();
        assert!(!posture.detect(&frame).unwrap().detected);
    }

    #[test]
    fn test_lying_figure_is_a_fall() {
        let mut frame = scene();
        frame.fill_rect(10, 38, 40, 6, SKIN);

        let result = PostureDetector::default().detect(&frame).unwrap();
        assert!(result.detected);
        assert_eq!(result.kind.as_deref(), Some("fall_detected"));
    }

    #[test]
    fn test_ppe_compliance() {
        let mut frame = scene();
        worker(&mut frame, 5, true, true);
        worker(&mut frame, 25, true, false);
        worker(&mut frame, 45, false, false);

        let result = PpeDetector::new(0.5).detect(&frame).unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.compliant, 1);
        assert_eq!(result.non_compliant, 2);
        assert_eq!(result.missing_items, vec!["vest".to_string(), "helmet".to_string()]);
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        let mut frame = scene();
        frame.pixels.truncate(10);
        assert!(PeopleCounter::default().detect(&frame).is_err());
    }

    #[test]
    fn test_calculate_db() {
        assert_eq!(calculate_db(&[]), 0.0);
        assert_eq!(calculate_db(&[0.0; 64]), 0.0);

        // Square wave: RMS equals amplitude
        let full: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert_eq!(calculate_db(&full), 100.0);

        let quiet: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 0.01 } else { -0.01 }).collect();
        assert_eq!(calculate_db(&quiet), 60.0);
    }

    #[test]
    fn test_meter_rejects_nan() {
        let mut meter = SoundLevelMeter;
        assert!(meter.detect(&[0.1, f32::NAN]).is_err());
        assert_eq!(meter.detect(&[0.0; 8]).unwrap().db, 0.0);
    }
}
