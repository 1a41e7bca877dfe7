//! Configuration parsing for the monitoring pipeline.
//!
//! This module owns translation of CLI arguments into a `PipelineConfig`
//! struct which the rest of the pipeline uses without re-parsing flags.

use anyhow::{bail, Result};
use clap::Args;
use frame_source::SourceConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Backend used to acquire frames.
pub(crate) enum SourceKind {
    /// Procedurally generated test pattern.
    Synthetic,
    /// Directory of still images replayed in a loop.
    Files,
}

impl SourceKind {
    /// Infer the backend from the source argument: the literal `synthetic`
    /// selects the test pattern, anything else is treated as a directory.
    pub(crate) fn from_uri(uri: &str) -> Self {
        if uri.eq_ignore_ascii_case("synthetic") {
            SourceKind::Synthetic
        } else {
            SourceKind::Files
        }
    }
}

#[derive(Clone, Debug)]
/// Canonical configuration shared by every part of the pipeline.
pub(crate) struct PipelineConfig {
    /// Source identifier: `synthetic` or an image directory path.
    pub(crate) source_uri: String,
    /// Backend inferred from `source_uri`.
    pub(crate) source_kind: SourceKind,
    /// Requested capture width in pixels.
    pub(crate) width: u32,
    /// Requested capture height in pixels.
    pub(crate) height: u32,
    /// Requested capture rate, best-effort.
    pub(crate) fps: u32,
    /// JPEG quality for the published stream (1-100).
    pub(crate) jpeg_quality: u8,
    /// Detections below this confidence are dropped before annotation and
    /// never reach the ledger.
    pub(crate) min_confidence: f32,
    /// Detections below this confidence never trigger an alert. Independent
    /// of `min_confidence` even though the defaults coincide.
    pub(crate) alert_threshold: f32,
    /// Per-class quiet period between delivered alerts, in seconds.
    pub(crate) alert_cooldown_secs: u64,
    /// Webhook receiving alert payloads. Alerts go to the log when unset.
    pub(crate) webhook_url: Option<String>,
    /// Camera location tag stamped onto every detection event.
    pub(crate) location: String,
    /// HTTP listen port.
    pub(crate) port: u16,
    /// Begin streaming at startup instead of waiting for the API call.
    pub(crate) autostart: bool,
}

impl PipelineConfig {
    pub(crate) fn source_config(&self) -> SourceConfig {
        SourceConfig {
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }
}

/// CLI arguments accepted by the `serve` subcommand.
#[derive(Debug, Default, Args)]
pub(crate) struct ServeArgs {
    /// Frame source: `synthetic` or a directory of still images.
    #[arg(long = "source", value_name = "URI")]
    pub(crate) source: Option<String>,
    /// Capture width in pixels.
    #[arg(long = "width", value_name = "PX")]
    pub(crate) width: Option<u32>,
    /// Capture height in pixels.
    #[arg(long = "height", value_name = "PX")]
    pub(crate) height: Option<u32>,
    /// Requested capture rate in frames per second.
    #[arg(long = "fps", value_name = "N")]
    pub(crate) fps: Option<u32>,
    /// JPEG quality used by the stream encoder (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY")]
    pub(crate) jpeg_quality: Option<u8>,
    /// Minimum confidence for a detection to be drawn and recorded.
    #[arg(long = "min-confidence", value_name = "SCORE")]
    pub(crate) min_confidence: Option<f32>,
    /// Minimum confidence for a detection to raise an alert.
    #[arg(long = "alert-threshold", value_name = "SCORE")]
    pub(crate) alert_threshold: Option<f32>,
    /// Seconds between alerts for the same object class.
    #[arg(long = "alert-cooldown", value_name = "SECONDS")]
    pub(crate) alert_cooldown: Option<u64>,
    /// Webhook URL receiving alert payloads as JSON.
    #[arg(long = "alert-webhook", value_name = "URL")]
    pub(crate) alert_webhook: Option<String>,
    /// Location tag recorded with each detection.
    #[arg(long = "location", value_name = "NAME")]
    pub(crate) location: Option<String>,
    /// HTTP listen port.
    #[arg(long = "port", value_name = "PORT")]
    pub(crate) port: Option<u16>,
    /// Start the stream immediately instead of waiting for the API call.
    #[arg(long = "autostart", action = clap::ArgAction::SetTrue)]
    pub(crate) autostart: bool,
}

impl TryFrom<ServeArgs> for PipelineConfig {
    type Error = anyhow::Error;

    fn try_from(args: ServeArgs) -> Result<Self> {
        let source_uri = args.source.unwrap_or_else(|| "synthetic".to_string());
        if source_uri.is_empty() {
            bail!("--source must not be empty");
        }
        let source_kind = SourceKind::from_uri(&source_uri);

        let width = args.width.unwrap_or(640);
        let height = args.height.unwrap_or(480);
        if width == 0 || height == 0 {
            bail!("Capture width and height must be positive integers");
        }

        let fps = args.fps.unwrap_or(30);
        if fps == 0 {
            bail!("--fps must be at least 1");
        }

        let jpeg_quality = args.jpeg_quality.unwrap_or(85);
        if !(1..=100).contains(&jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }

        let min_confidence = args.min_confidence.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&min_confidence) {
            bail!("--min-confidence must be between 0.0 and 1.0");
        }

        let alert_threshold = args.alert_threshold.unwrap_or(0.5);
        if !(0.0..=1.0).contains(&alert_threshold) {
            bail!("--alert-threshold must be between 0.0 and 1.0");
        }

        let location = args.location.unwrap_or_else(|| "CCTV-1".to_string());
        if location.is_empty() {
            bail!("--location must not be empty");
        }

        Ok(Self {
            source_uri,
            source_kind,
            width,
            height,
            fps,
            jpeg_quality,
            min_confidence,
            alert_threshold,
            alert_cooldown_secs: args.alert_cooldown.unwrap_or(60),
            webhook_url: args.alert_webhook,
            location,
            port: args.port.unwrap_or(8000),
            autostart: args.autostart,
        })
    }
}
