//! Shared structs passed between the pump, the control plane, and the HTTP
//! handlers, plus the JSON shapes served by the dashboard API.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use detect_core::{Detector, RawDetection};
use frame_source::FrameSource;
use serde::Serialize;

use crate::pipeline::alerts::{AlertThrottler, Notifier};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::control::{default_source_factory, StreamControl};
use crate::pipeline::ledger::{DetectionEvent, DetectionLedger, LedgerStats};

/// Latest encoded frame published by the pump for stream subscribers.
#[derive(Clone)]
pub(crate) struct FramePacket {
    pub(crate) jpeg: Vec<u8>,
    pub(crate) frame_number: u64,
    pub(crate) timestamp_ms: i64,
    pub(crate) fps: f32,
}

/// Builds a fresh frame source for each streaming session.
pub(crate) type SourceFactory = Box<dyn Fn() -> Box<dyn FrameSource> + Send + Sync>;

/// The one owned aggregate behind the whole process. The pump thread is the
/// only writer of ledger, throttler and latest; handlers read snapshots.
pub(crate) struct PipelineState {
    pub(crate) config: PipelineConfig,
    pub(crate) ledger: Mutex<DetectionLedger>,
    pub(crate) throttler: Mutex<AlertThrottler>,
    pub(crate) detector: Mutex<Box<dyn Detector>>,
    pub(crate) latest: Mutex<Option<FramePacket>>,
    pub(crate) control: StreamControl,
    pub(crate) source_factory: SourceFactory,
    pub(crate) model_ready: AtomicBool,
    pub(crate) source_active: AtomicBool,
}

impl PipelineState {
    pub(crate) fn new(
        config: PipelineConfig,
        detector: Box<dyn Detector>,
        notifier: Box<dyn Notifier>,
    ) -> Arc<Self> {
        let factory = default_source_factory(&config);
        Self::with_source_factory(config, detector, notifier, factory)
    }

    pub(crate) fn with_source_factory(
        config: PipelineConfig,
        detector: Box<dyn Detector>,
        notifier: Box<dyn Notifier>,
        source_factory: SourceFactory,
    ) -> Arc<Self> {
        let throttler = AlertThrottler::new(
            config.alert_threshold,
            config.alert_cooldown_secs,
            notifier,
        );
        Arc::new(Self {
            config,
            ledger: Mutex::new(DetectionLedger::new(Utc::now())),
            throttler: Mutex::new(throttler),
            detector: Mutex::new(detector),
            latest: Mutex::new(None),
            control: StreamControl::new(),
            source_factory,
            model_ready: AtomicBool::new(true),
            source_active: AtomicBool::new(false),
        })
    }
}

#[derive(Serialize)]
pub(crate) struct DetectionDto {
    pub(crate) class: String,
    pub(crate) confidence: f32,
    /// Pixel-space `[x1, y1, x2, y2]`.
    pub(crate) bbox: [f32; 4],
}

impl From<&RawDetection> for DetectionDto {
    fn from(det: &RawDetection) -> Self {
        let [x, y, w, h] = det.bbox_xywh;
        Self {
            class: det.label.clone(),
            confidence: det.confidence,
            bbox: [x, y, x + w, y + h],
        }
    }
}

#[derive(Serialize)]
pub(crate) struct DetectionsResponse {
    pub(crate) detections: Vec<DetectionDto>,
    pub(crate) count: usize,
}

#[derive(Serialize)]
pub(crate) struct LogEntryDto {
    pub(crate) id: u64,
    pub(crate) timestamp: String,
    pub(crate) object: String,
    pub(crate) confidence: f32,
    pub(crate) location: String,
    pub(crate) status: &'static str,
    #[serde(rename = "email_sent")]
    pub(crate) alert_sent: bool,
}

impl From<&DetectionEvent> for LogEntryDto {
    fn from(event: &DetectionEvent) -> Self {
        Self {
            id: event.id,
            timestamp: event
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            object: event.object_class.clone(),
            confidence: event.confidence,
            location: event.location.clone(),
            status: event.severity().as_status(),
            alert_sent: event.alert_sent,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct LogsResponse {
    pub(crate) logs: Vec<LogEntryDto>,
    pub(crate) total: usize,
}

#[derive(Serialize)]
pub(crate) struct StatusResponse {
    pub(crate) is_streaming: bool,
    pub(crate) model_loaded: bool,
    pub(crate) camera_active: bool,
}

#[derive(Serialize)]
pub(crate) struct StatsResponse {
    pub(crate) total_detections: u64,
    pub(crate) active_cameras: u8,
    pub(crate) uptime_hours: f64,
    pub(crate) threat_level: &'static str,
    pub(crate) current_detections: usize,
}

impl StatsResponse {
    pub(crate) fn from_stats(stats: LedgerStats, streaming: bool) -> Self {
        Self {
            total_detections: stats.total_detections,
            active_cameras: if streaming { 1 } else { 0 },
            uptime_hours: stats.uptime_hours,
            threat_level: stats.threat_level.as_threat_level(),
            current_detections: stats.current_detections,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct ActionResponse {
    pub(crate) status: &'static str,
    pub(crate) message: String,
}

impl ActionResponse {
    pub(crate) fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
        }
    }

    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
}
