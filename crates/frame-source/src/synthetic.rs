//! Deterministic procedural test pattern, useful when no capture hardware is
//! attached. The pattern animates with the frame index so downstream pacing
//! and encoding behave as they would on live footage.

use chrono::Utc;

use crate::types::{CaptureError, Frame, FrameFormat, SourceConfig};
use crate::FrameSource;

const URI: &str = "synthetic";

pub struct SyntheticSource {
    config: SourceConfig,
    frame_index: u64,
    open: bool,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_index: 0,
            open: false,
        }
    }

    /// Renders the pattern for the current frame index: a diagonal color
    /// wash, a sweeping vertical bar and a bouncing block that gives the
    /// stream visible motion.
    fn render(&self) -> Vec<u8> {
        let width = self.config.width;
        let height = self.config.height;
        let t = self.frame_index;

        let bar_x = ((t * 5) % width as u64) as u32;
        let block_w = width / 8;
        let block_h = height / 8;
        let span_x = (width - block_w) as u64;
        let span_y = (height - block_h) as u64;
        let block_x = bounce(t * 3, span_x) as u32;
        let block_y = bounce(t * 2, span_y) as u32;

        let wash_x = (t % 256) as u32;
        let wash_y = ((t / 2) % 256) as u32;
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let in_bar = x.abs_diff(bar_x) < 2;
                let in_block = x >= block_x
                    && x < block_x + block_w
                    && y >= block_y
                    && y < block_y + block_h;
                if in_block {
                    data.extend_from_slice(&[232, 64, 48]);
                } else if in_bar {
                    data.extend_from_slice(&[240, 240, 240]);
                } else {
                    let r = (((x + wash_x) % 256) / 2) as u8;
                    let g = (((y + wash_y) % 256) / 2) as u8;
                    let b = ((((x + y) / 2) % 256) / 2) as u8;
                    data.extend_from_slice(&[r, g, b]);
                }
            }
        }
        data
    }
}

/// Maps a monotonically increasing tick onto a forward-then-back sweep over
/// `[0, span]`.
fn bounce(tick: u64, span: u64) -> u64 {
    if span == 0 {
        return 0;
    }
    let phase = tick % (span * 2);
    if phase < span { phase } else { span * 2 - phase }
}

impl FrameSource for SyntheticSource {
    fn uri(&self) -> &str {
        URI
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        self.open = true;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen {
                uri: URI.to_string(),
            });
        }
        let data = self.render();
        self.frame_index += 1;
        Ok(Frame {
            data,
            width: self.config.width,
            height: self.config.height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Rgb8,
        })
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
