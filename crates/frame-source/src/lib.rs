//! Frame acquisition boundary for the detection pipeline.
//!
//! A [`FrameSource`] hands out raw RGB frames one at a time. Backends are
//! deliberately small: [`SyntheticSource`] renders a deterministic test
//! pattern and [`FileSource`] loops over a directory of stills. Hardware
//! capture lives behind the same trait and is wired in by the application.

pub mod files;
pub mod synthetic;
pub mod types;

pub use files::FileSource;
pub use synthetic::SyntheticSource;
pub use types::{CaptureError, Frame, FrameFormat, SourceConfig};

/// Pull-based frame producer owned by exactly one consumer at a time.
///
/// `open` applies the construction-time [`SourceConfig`] on a best-effort
/// basis; callers must treat the configured resolution and rate as requested,
/// not guaranteed. `close` is safe to call on an already-closed source.
pub trait FrameSource: Send {
    /// Identifier used in logs and error reports.
    fn uri(&self) -> &str;

    fn open(&mut self) -> Result<(), CaptureError>;

    /// Blocks until the next frame is available or the read fails. A failed
    /// read leaves the source open; callers decide whether to retry.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;
}
