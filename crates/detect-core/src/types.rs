use thiserror::Error;

/// Single detection returned by a detector.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub class_id: usize,
    pub label: String,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
    /// Pixel-space box `[x, y, width, height]`, top-left origin.
    pub bbox_xywh: [f32; 4],
}

impl RawDetection {
    pub fn new(class_id: usize, label: impl Into<String>, confidence: f32, bbox_xywh: [f32; 4]) -> Self {
        Self {
            class_id,
            label: label.into(),
            confidence,
            bbox_xywh,
        }
    }
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("frame rejected by detector: {0}")]
    BadFrame(String),
}

/// Deterministic per-class display color. Hue steps by the golden angle so
/// neighboring class ids land far apart on the wheel.
pub fn class_color(class_id: usize) -> [u8; 3] {
    let hue = (class_id * 137) % 360;
    let saturation = 0.7_f32;
    let value = 0.9_f32;

    let c = value * saturation;
    let x = c * (1.0 - ((hue as f32 / 60.0) % 2.0 - 1.0).abs());
    let m = value - c;

    let (r, g, b) = match hue / 60 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    [
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    ]
}
