//! Replay detector for tests: hands back a fixed list of detections per
//! `detect` call, then empty results once the script runs out.

use std::collections::VecDeque;

use frame_source::Frame;

use crate::types::{DetectError, RawDetection};
use crate::Detector;

pub struct ScriptedDetector {
    classes: Vec<String>,
    frames: VecDeque<Vec<RawDetection>>,
}

impl ScriptedDetector {
    /// `frames[i]` is the result of the i-th `detect` call.
    pub fn new(classes: &[&str], frames: Vec<Vec<RawDetection>>) -> Self {
        Self {
            classes: classes.iter().map(|s| s.to_string()).collect(),
            frames: frames.into(),
        }
    }

    /// Calls left before the script is exhausted.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>, DetectError> {
        Ok(self.frames.pop_front().unwrap_or_default())
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
