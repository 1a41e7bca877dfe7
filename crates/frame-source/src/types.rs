use image::RgbImage;
use thiserror::Error;

/// Raw RGB frame captured from a video source.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

impl Frame {
    /// Copies the pixel data into an [`RgbImage`] for drawing and encoding.
    /// Returns `None` if the buffer does not match the declared dimensions.
    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Rgb8,
}

/// Capture parameters fixed when a source is constructed. Applied at `open`
/// on a best-effort basis.
#[derive(Clone, Copy, Debug)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source {uri:?} is not open")]
    NotOpen { uri: String },
    #[error("failed to read frame from {uri:?}")]
    Read {
        uri: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
