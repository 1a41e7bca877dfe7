//! The stream pump: one sequential cycle per frame on a dedicated thread.
//!
//! Each iteration checks the stop flag, reads a frame, runs the detector,
//! annotates, records the frame in the ledger, resolves alerts, encodes and
//! publishes, then paces toward the configured rate. Every I/O failure is
//! contained to its own cycle: a failed read backs off and retries, a failed
//! encode skips that publish, and a failed alert delivery is the throttler's
//! concern. The pump exits only when the stop flag is observed, and closes
//! the source on its way out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use frame_source::FrameSource;
use tracing::{debug, error, info, warn};

use crate::pipeline::alerts::AlertOutcome;
use crate::pipeline::annotate::{annotate_frame, encode_jpeg};
use crate::pipeline::data::{FramePacket, PipelineState};

/// Delay before retrying after a failed frame read.
const READ_BACKOFF: Duration = Duration::from_millis(100);

/// Runs until `stop` is set, then releases the source. Takes ownership of
/// the opened source for the whole session, so nobody can release it under
/// an in-flight read.
pub(crate) fn run_pump(
    state: Arc<PipelineState>,
    mut source: Box<dyn FrameSource>,
    stop: Arc<AtomicBool>,
) {
    let pace = Duration::from_secs_f64(1.0 / f64::from(state.config.fps.max(1)));
    let mut frame_number: u64 = 0;
    let mut smoothed_fps: f32 = 0.0;
    let mut last_instant = Instant::now();

    info!(
        source = %source.uri(),
        fps = state.config.fps,
        "stream pump running"
    );

    while !stop.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();

        let frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                warn!("frame read failed: {err}; retrying");
                metrics::counter!("watchpost_frame_read_failures_total").increment(1);
                thread::sleep(READ_BACKOFF);
                continue;
            }
        };
        frame_number += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(last_instant).as_secs_f32();
        last_instant = now;
        if elapsed > 0.0 {
            let instant = 1.0 / elapsed;
            smoothed_fps = if smoothed_fps == 0.0 {
                instant
            } else {
                0.9 * smoothed_fps + 0.1 * instant
            };
        }
        metrics::gauge!("watchpost_pipeline_fps").set(f64::from(smoothed_fps));

        let detect_start = Instant::now();
        let raw = {
            let detections = match state.detector.lock() {
                Ok(mut detector) => detector.detect(&frame),
                Err(_) => {
                    error!("detector lock poisoned; stopping pump");
                    break;
                }
            };
            match detections {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(frame = frame_number, "detector failed: {err}; skipping frame");
                    metrics::counter!("watchpost_detect_failures_total").increment(1);
                    pace_cycle(cycle_start, pace);
                    continue;
                }
            }
        };
        metrics::histogram!("watchpost_stage_seconds", "stage" => "detect")
            .record(detect_start.elapsed().as_secs_f64());

        let (rendered, filtered) =
            match annotate_frame(&frame, &raw, state.config.min_confidence) {
                Ok(result) => result,
                Err(err) => {
                    warn!(frame = frame_number, "annotation failed: {err}; skipping frame");
                    pace_cycle(cycle_start, pace);
                    continue;
                }
            };

        let timestamp = Utc::now();
        let event_ids = match state.ledger.lock() {
            Ok(mut ledger) => {
                ledger.record_frame(&filtered, timestamp, &state.config.location)
            }
            Err(_) => {
                error!("ledger lock poisoned; stopping pump");
                break;
            }
        };
        metrics::counter!("watchpost_detections_total").increment(filtered.len() as u64);

        // Alert resolution happens outside the ledger lock; only the sent
        // outcome is written back onto the freshly recorded events.
        for (id, detection) in event_ids.iter().zip(&filtered) {
            let outcome = match state.throttler.lock() {
                Ok(mut throttler) => throttler.maybe_alert(
                    &detection.label,
                    detection.confidence,
                    timestamp,
                    &state.config.location,
                ),
                Err(_) => {
                    error!("throttler lock poisoned; skipping alerts");
                    break;
                }
            };
            if outcome == AlertOutcome::Sent {
                if let Ok(mut ledger) = state.ledger.lock() {
                    ledger.mark_alert_sent(*id);
                }
            }
        }

        let encode_start = Instant::now();
        match encode_jpeg(&rendered, state.config.jpeg_quality) {
            Ok(jpeg) => {
                metrics::histogram!("watchpost_stage_seconds", "stage" => "encode")
                    .record(encode_start.elapsed().as_secs_f64());
                let packet = FramePacket {
                    jpeg,
                    frame_number,
                    timestamp_ms: frame.timestamp_ms,
                    fps: smoothed_fps,
                };
                if frame_number % 30 == 0 {
                    debug!(
                        "publish heartbeat: frame #{}, {:.1} fps, ts={}",
                        packet.frame_number, packet.fps, packet.timestamp_ms
                    );
                }
                if let Ok(mut latest) = state.latest.lock() {
                    *latest = Some(packet);
                }
            }
            Err(err) => {
                warn!(frame = frame_number, "encode failed: {err}; skipping publish");
                metrics::counter!("watchpost_encode_failures_total").increment(1);
            }
        }

        pace_cycle(cycle_start, pace);
    }

    source.close();
    state.source_active.store(false, Ordering::SeqCst);
    if let Ok(mut latest) = state.latest.lock() {
        *latest = None;
    }
    info!(frames = frame_number, "stream pump stopped, source released");
}

/// Sleeps out the remainder of the frame interval. The stop flag is checked
/// at the top of the next cycle, so cancellation lands within one frame of
/// work plus this delay.
fn pace_cycle(cycle_start: Instant, pace: Duration) {
    let elapsed = cycle_start.elapsed();
    if elapsed < pace {
        thread::sleep(pace - elapsed);
    }
}
