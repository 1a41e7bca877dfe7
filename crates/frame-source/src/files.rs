//! Directory-backed playback source. Loops over the still images found at
//! open time, decoding and resizing each to the configured frame size. Handy
//! for replaying captured footage through the full pipeline.

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use chrono::Utc;
use image::imageops::FilterType;
use tracing::debug;

use crate::types::{CaptureError, Frame, FrameFormat, SourceConfig};
use crate::FrameSource;

const EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct FileSource {
    uri: String,
    dir: PathBuf,
    config: SourceConfig,
    files: Vec<PathBuf>,
    cursor: usize,
    open: bool,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(dir: P, config: SourceConfig) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            uri: dir.display().to_string(),
            dir,
            config,
            files: Vec::new(),
            cursor: 0,
            open: false,
        }
    }

    fn scan(&self) -> Result<Vec<PathBuf>, CaptureError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|_| CaptureError::Open {
            uri: self.uri.clone(),
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl FrameSource for FileSource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        let files = self.scan()?;
        if files.is_empty() {
            return Err(CaptureError::Open {
                uri: self.uri.clone(),
            });
        }
        debug!(dir = %self.uri, count = files.len(), "file source opened");
        self.files = files;
        self.cursor = 0;
        self.open = true;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen {
                uri: self.uri.clone(),
            });
        }
        let path = self.files[self.cursor % self.files.len()].clone();
        self.cursor = self.cursor.wrapping_add(1);

        let decoded = image::open(&path).map_err(|err| CaptureError::Read {
            uri: path.display().to_string(),
            source: anyhow!(err),
        })?;
        let rgb = decoded.to_rgb8();
        let rgb = if rgb.width() != self.config.width || rgb.height() != self.config.height {
            image::imageops::resize(
                &rgb,
                self.config.width,
                self.config.height,
                FilterType::Triangle,
            )
        } else {
            rgb
        };

        Ok(Frame {
            data: rgb.into_raw(),
            width: self.config.width,
            height: self.config.height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Rgb8,
        })
    }

    fn close(&mut self) {
        self.open = false;
        self.files.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn config() -> SourceConfig {
        SourceConfig {
            width: 32,
            height: 24,
            fps: 30,
        }
    }

    #[test]
    fn open_fails_on_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FileSource::new(dir.path(), config());
        assert!(matches!(source.open(), Err(CaptureError::Open { .. })));
        assert!(!source.is_open());
    }

    #[test]
    fn open_fails_on_missing_directory() {
        let mut source = FileSource::new("/nonexistent/frames", config());
        assert!(matches!(source.open(), Err(CaptureError::Open { .. })));
    }

    #[test]
    fn reads_loop_over_directory_and_resize() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::from_pixel(8, 8, image::Rgb([10, 20, 30]));
        img.save(dir.path().join("a.png")).unwrap();
        img.save(dir.path().join("b.png")).unwrap();

        let mut source = FileSource::new(dir.path(), config());
        source.open().unwrap();
        for _ in 0..3 {
            let frame = source.read_frame().unwrap();
            assert_eq!(frame.width, 32);
            assert_eq!(frame.height, 24);
            assert_eq!(frame.data.len(), 32 * 24 * 3);
        }
    }

    #[test]
    fn undecodable_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.jpg"), b"not an image").unwrap();

        let mut source = FileSource::new(dir.path(), config());
        source.open().unwrap();
        assert!(matches!(
            source.read_frame(),
            Err(CaptureError::Read { .. })
        ));
        // The cursor advanced past the bad file, so the source stays usable.
        assert!(source.is_open());
    }
}
