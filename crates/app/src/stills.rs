//! One-shot still detection: run the detector and annotator over a single
//! image file and write the annotated JPEG next to it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use detect_core::{Detector, SyntheticDetector};
use frame_source::{Frame, FrameFormat};
use tracing::info;

use crate::pipeline::annotate::{annotate_frame, encode_jpeg};

/// CLI arguments for the `detect-image` subcommand.
#[derive(Debug, Args)]
pub(crate) struct DetectImageArgs {
    /// Image file to analyze.
    pub(crate) input: PathBuf,
    /// Output path; defaults to `<input>.detected.jpg`.
    #[arg(long = "output", value_name = "PATH")]
    pub(crate) output: Option<PathBuf>,
    /// Minimum confidence for a detection to be drawn.
    #[arg(long = "min-confidence", value_name = "SCORE", default_value_t = 0.5)]
    pub(crate) min_confidence: f32,
    /// JPEG quality for the annotated output (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = 85)]
    pub(crate) jpeg_quality: u8,
}

pub(crate) fn run(args: &DetectImageArgs) -> Result<()> {
    let mut detector = SyntheticDetector::new();
    detect_image(args, &mut detector)
}

fn detect_image(args: &DetectImageArgs, detector: &mut dyn Detector) -> Result<()> {
    let image = image::open(&args.input)
        .with_context(|| format!("failed to open image {:?}", args.input))?
        .to_rgb8();
    let frame = Frame {
        width: image.width(),
        height: image.height(),
        data: image.into_raw(),
        timestamp_ms: Utc::now().timestamp_millis(),
        format: FrameFormat::Rgb8,
    };

    let detections = detector
        .detect(&frame)
        .with_context(|| format!("detector {:?} failed", detector.name()))?;
    let (rendered, kept) = annotate_frame(&frame, &detections, args.min_confidence)?;

    for detection in &kept {
        info!(
            class = %detection.label,
            confidence = format_args!("{:.2}", detection.confidence),
            "detected"
        );
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input));
    let jpeg = encode_jpeg(&rendered, args.jpeg_quality)?;
    std::fs::write(&output, &jpeg)
        .with_context(|| format!("failed to write annotated image {output:?}"))?;
    info!(
        detections = kept.len(),
        output = %output.display(),
        "annotated image written"
    );
    Ok(())
}

fn default_output(input: &std::path::Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{stem}.detected.jpg"))
}
