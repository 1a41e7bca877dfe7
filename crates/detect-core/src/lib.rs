//! Object-detection boundary for the pipeline.
//!
//! The pipeline only ever talks to a [`Detector`]; which model sits behind it
//! is an integration concern. [`SyntheticDetector`] emits a deterministic
//! detection schedule so the full system runs without model weights, and
//! [`ScriptedDetector`] replays fixed per-frame results for tests.

pub mod scripted;
pub mod synthetic;
pub mod types;

pub use scripted::ScriptedDetector;
pub use synthetic::SyntheticDetector;
pub use types::{class_color, DetectError, RawDetection};

use frame_source::Frame;

/// Common interface for object detectors.
pub trait Detector: Send {
    /// Runs inference over a single frame. Detections come back in model
    /// output order with pixel-space boxes.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectError>;

    /// Class labels this detector can emit, indexed by `class_id`.
    fn classes(&self) -> &[String];

    /// Detector name for logs and status reporting.
    fn name(&self) -> &str;
}
