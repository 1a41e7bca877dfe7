//! Schedule-driven detector used when no model weights are available. The
//! output is deterministic in the number of `detect` calls, which keeps
//! demos reproducible and lets the rest of the pipeline exercise filtering,
//! severity derivation and alert throttling with realistic-looking data.

use frame_source::Frame;

use crate::types::{DetectError, RawDetection};
use crate::Detector;

const CLASSES: [&str; 3] = ["knife", "pistol", "rifle"];

/// Calls a class stays active before the schedule rotates to the next one.
const CLASS_HOLD: u64 = 90;

/// Every n-th call reports nothing, so current-frame state visibly clears.
const QUIET_EVERY: u64 = 7;

/// Confidence triangle-wave period, in calls.
const CONFIDENCE_PERIOD: u64 = 64;

pub struct SyntheticDetector {
    classes: Vec<String>,
    tick: u64,
}

impl SyntheticDetector {
    pub fn new() -> Self {
        // Start mid-wave so the very first call already yields a
        // high-confidence detection.
        Self {
            classes: CLASSES.iter().map(|s| s.to_string()).collect(),
            tick: CONFIDENCE_PERIOD / 2,
        }
    }
}

impl Default for SyntheticDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for SyntheticDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectError> {
        let tick = self.tick;
        self.tick += 1;

        if tick % QUIET_EVERY == 0 {
            return Ok(Vec::new());
        }

        let class_id = ((tick / CLASS_HOLD) % self.classes.len() as u64) as usize;

        // Triangle wave over [0.35, 0.97] so some detections fall below the
        // pipeline thresholds and severities span all three bands.
        let phase = (tick % CONFIDENCE_PERIOD) as f32 / (CONFIDENCE_PERIOD - 1) as f32;
        let tri = if phase < 0.5 { phase * 2.0 } else { 2.0 - phase * 2.0 };
        let confidence = 0.35 + 0.62 * tri;

        let bw = frame.width as f32 / 4.0;
        let bh = frame.height as f32 / 4.0;
        let x = sweep(tick * 3, frame.width as f32 - bw);
        let y = sweep(tick * 2, frame.height as f32 - bh);

        Ok(vec![RawDetection::new(
            class_id,
            self.classes[class_id].clone(),
            confidence,
            [x, y, bw, bh],
        )])
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// Sweeps forward then back over `[0, span]` as the tick advances.
fn sweep(tick: u64, span: f32) -> f32 {
    if span <= 0.0 {
        return 0.0;
    }
    let span_ticks = span as u64 + 1;
    let phase = tick % (span_ticks * 2);
    if phase < span_ticks {
        (phase as f32).min(span)
    } else {
        ((span_ticks * 2 - phase) as f32).min(span)
    }
}
