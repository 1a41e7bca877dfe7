//! Stream lifecycle. The control plane owns the session state machine
//! (`Idle → Opening → Running → Stopping → Idle`); the pump thread only
//! polls the stop flag it is handed at spawn time.
//!
//! The frame source is opened on the caller's thread so a device failure
//! surfaces directly from `start_stream`, then ownership moves to the pump
//! thread for the whole session. `stop_stream` joins that thread, so the
//! source is never released while a read is in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};
use frame_source::{FileSource, SyntheticSource};
use tracing::{info, warn};

use crate::pipeline::config::{PipelineConfig, SourceKind};
use crate::pipeline::data::{PipelineState, SourceFactory};
use crate::pipeline::pump;
use crate::pipeline::telemetry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SessionState {
    Idle,
    Opening,
    Running,
    Stopping,
}

struct Session {
    state: SessionState,
    stop: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

/// Session bookkeeping guarded by one lock. Held only for short transitions;
/// never across the pump join (see `stop_stream`).
pub(crate) struct StreamControl {
    inner: Mutex<Session>,
}

impl StreamControl {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Session {
                state: SessionState::Idle,
                stop: Arc::new(AtomicBool::new(false)),
                pump: None,
            }),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.inner
            .lock()
            .map(|session| session.state == SessionState::Running)
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Session>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("stream control lock poisoned"))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StopOutcome {
    Stopped,
    NotRunning,
}

/// Builds sources from the configured backend, one per streaming session.
pub(crate) fn default_source_factory(config: &PipelineConfig) -> SourceFactory {
    let uri = config.source_uri.clone();
    let kind = config.source_kind.clone();
    let source_config = config.source_config();
    Box::new(move || match kind {
        SourceKind::Synthetic => Box::new(SyntheticSource::new(source_config)),
        SourceKind::Files => Box::new(FileSource::new(&uri, source_config)),
    })
}

/// Idempotent start. Opens a fresh source and hands it to a new pump thread;
/// a source that will not open leaves the session Idle and surfaces as an
/// error to the caller.
pub(crate) fn start_stream(state: &Arc<PipelineState>) -> Result<StartOutcome> {
    let mut session = state.control.lock()?;

    if session.state == SessionState::Running {
        let finished = session
            .pump
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true);
        if !finished {
            return Ok(StartOutcome::AlreadyRunning);
        }
        // The pump thread is gone without a stop request; reclaim the slot.
        warn!("reaping a stream pump that exited unexpectedly");
        if let Some(handle) = session.pump.take() {
            let _ = handle.join();
        }
        session.state = SessionState::Idle;
    }
    if session.state != SessionState::Idle {
        return Ok(StartOutcome::AlreadyRunning);
    }

    session.state = SessionState::Opening;
    let mut source = (state.source_factory)();
    if let Err(err) = source.open() {
        session.state = SessionState::Idle;
        return Err(err).with_context(|| {
            format!("failed to open video source {:?}", state.config.source_uri)
        });
    }
    state.source_active.store(true, Ordering::SeqCst);

    let stop = Arc::new(AtomicBool::new(false));
    session.stop = stop.clone();
    let pump_state = state.clone();
    match telemetry::spawn_thread("stream-pump", move || {
        pump::run_pump(pump_state, source, stop)
    }) {
        Ok(handle) => {
            session.pump = Some(handle);
            session.state = SessionState::Running;
            metrics::gauge!("watchpost_stream_active").set(1.0);
            info!(source = %state.config.source_uri, "stream started");
            Ok(StartOutcome::Started)
        }
        Err(err) => {
            // The closure owning the source was dropped with the failed
            // spawn, so there is nothing left holding the device.
            session.state = SessionState::Idle;
            state.source_active.store(false, Ordering::SeqCst);
            Err(anyhow!("failed to spawn stream pump thread: {err}"))
        }
    }
}

/// Idempotent stop. Sets the stop flag and joins the pump thread, which
/// closes the source on its way out; bounded by one cycle of work.
pub(crate) fn stop_stream(state: &Arc<PipelineState>) -> Result<StopOutcome> {
    let handle = {
        let mut session = state.control.lock()?;
        if session.state != SessionState::Running {
            return Ok(StopOutcome::NotRunning);
        }
        session.state = SessionState::Stopping;
        session.stop.store(true, Ordering::SeqCst);
        session.pump.take()
    };

    if let Some(handle) = handle {
        if handle.join().is_err() {
            warn!("stream pump thread panicked during shutdown");
        }
    }

    let mut session = state.control.lock()?;
    session.state = SessionState::Idle;
    metrics::gauge!("watchpost_stream_active").set(0.0);
    info!("stream stopped");
    Ok(StopOutcome::Stopped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use detect_core::{RawDetection, ScriptedDetector};
    use frame_source::{CaptureError, Frame, FrameSource};

    use crate::pipeline::alerts::{AlertPayload, Notifier, NotifyError};
    use crate::pipeline::config::ServeArgs;

    /// Synthetic source wrapper that records open/close transitions.
    struct TrackedSource {
        inner: SyntheticSource,
        opens: Arc<Mutex<u32>>,
        closes: Arc<Mutex<u32>>,
    }

    impl FrameSource for TrackedSource {
        fn uri(&self) -> &str {
            self.inner.uri()
        }

        fn open(&mut self) -> Result<(), CaptureError> {
            *self.opens.lock().unwrap() += 1;
            self.inner.open()
        }

        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            self.inner.read_frame()
        }

        fn close(&mut self) {
            *self.closes.lock().unwrap() += 1;
            self.inner.close();
        }

        fn is_open(&self) -> bool {
            self.inner.is_open()
        }
    }

    struct SinkNotifier {
        sent: Arc<Mutex<Vec<AlertPayload>>>,
    }

    impl Notifier for SinkNotifier {
        fn notify(&mut self, alert: &AlertPayload) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(alert.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "sink"
        }
    }

    fn test_config() -> PipelineConfig {
        let mut config = PipelineConfig::try_from(ServeArgs::default()).unwrap();
        // Tiny frames and a fast pace keep the pump tests quick.
        config.width = 64;
        config.height = 48;
        config.fps = 200;
        config
    }

    fn tracked_state(
        detector: Box<dyn detect_core::Detector>,
    ) -> (
        Arc<PipelineState>,
        Arc<Mutex<Vec<AlertPayload>>>,
        Arc<Mutex<u32>>,
        Arc<Mutex<u32>>,
    ) {
        let config = test_config();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let opens = Arc::new(Mutex::new(0));
        let closes = Arc::new(Mutex::new(0));
        let notifier = Box::new(SinkNotifier { sent: sent.clone() });
        let source_config = config.source_config();
        let factory_opens = opens.clone();
        let factory_closes = closes.clone();
        let factory: SourceFactory = Box::new(move || {
            Box::new(TrackedSource {
                inner: SyntheticSource::new(source_config),
                opens: factory_opens.clone(),
                closes: factory_closes.clone(),
            })
        });
        let state = PipelineState::with_source_factory(config, detector, notifier, factory);
        (state, sent, opens, closes)
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    fn knife(confidence: f32) -> RawDetection {
        RawDetection::new(0, "knife", confidence, [4.0, 4.0, 20.0, 16.0])
    }

    #[test]
    fn start_is_idempotent_and_stop_releases_the_source() {
        let detector = Box::new(ScriptedDetector::new(&["knife"], Vec::new()));
        let (state, _, opens, closes) = tracked_state(detector);

        assert_eq!(start_stream(&state).unwrap(), StartOutcome::Started);
        assert_eq!(start_stream(&state).unwrap(), StartOutcome::AlreadyRunning);
        assert!(state.control.is_running());
        assert!(state.source_active.load(Ordering::SeqCst));
        assert_eq!(*opens.lock().unwrap(), 1);

        assert_eq!(stop_stream(&state).unwrap(), StopOutcome::Stopped);
        assert_eq!(stop_stream(&state).unwrap(), StopOutcome::NotRunning);
        assert!(!state.control.is_running());
        assert!(!state.source_active.load(Ordering::SeqCst));
        assert_eq!(*closes.lock().unwrap(), 1);

        // The source was released, so a fresh session can reacquire it.
        assert_eq!(start_stream(&state).unwrap(), StartOutcome::Started);
        assert_eq!(*opens.lock().unwrap(), 2);
        assert_eq!(stop_stream(&state).unwrap(), StopOutcome::Stopped);
        assert_eq!(*closes.lock().unwrap(), 2);
    }

    #[test]
    fn failed_open_leaves_the_session_idle_and_restartable() {
        struct DeadSource;
        impl FrameSource for DeadSource {
            fn uri(&self) -> &str {
                "dead"
            }
            fn open(&mut self) -> Result<(), CaptureError> {
                Err(CaptureError::Open {
                    uri: "dead".to_string(),
                })
            }
            fn read_frame(&mut self) -> Result<Frame, CaptureError> {
                Err(CaptureError::NotOpen {
                    uri: "dead".to_string(),
                })
            }
            fn close(&mut self) {}
            fn is_open(&self) -> bool {
                false
            }
        }

        let detector = Box::new(ScriptedDetector::new(&["knife"], Vec::new()));
        let config = test_config();
        let notifier = Box::new(SinkNotifier {
            sent: Arc::new(Mutex::new(Vec::new())),
        });
        let state = PipelineState::with_source_factory(
            config,
            detector,
            notifier,
            Box::new(|| Box::new(DeadSource)),
        );

        assert!(start_stream(&state).is_err());
        assert!(!state.control.is_running());
        assert!(!state.source_active.load(Ordering::SeqCst));
        // Still Idle, so a second attempt goes through the open path again.
        assert!(start_stream(&state).is_err());
    }

    #[test]
    fn pump_cycles_feed_the_ledger_and_the_notifier() {
        // Frame 2 carries one high-confidence knife; frames 1 and 3 are
        // empty, so after three frames the current snapshot is clear while
        // the log remembers the event.
        let detector = Box::new(ScriptedDetector::new(
            &["knife"],
            vec![vec![], vec![knife(0.9)], vec![]],
        ));
        let (state, sent, _, _) = tracked_state(detector);

        assert_eq!(start_stream(&state).unwrap(), StartOutcome::Started);
        assert!(wait_until(Duration::from_secs(5), || {
            state.latest.lock().unwrap().as_ref().map(|p| p.frame_number) >= Some(4)
        }));
        assert_eq!(stop_stream(&state).unwrap(), StopOutcome::Stopped);

        let ledger = state.ledger.lock().unwrap();
        let stats = ledger.stats(chrono::Utc::now());
        assert_eq!(stats.total_detections, 1);
        assert_eq!(stats.current_detections, 0);
        assert_eq!(stats.threat_level.as_threat_level(), "Low");

        let log = ledger.log_snapshot(false);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].object_class, "knife");
        // The alert was delivered and written back onto the same event.
        assert!(log[0].alert_sent);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn sub_threshold_detections_never_reach_the_ledger() {
        let detector = Box::new(ScriptedDetector::new(
            &["knife"],
            vec![vec![knife(0.3)], vec![knife(0.4)]],
        ));
        let (state, sent, _, _) = tracked_state(detector);

        assert_eq!(start_stream(&state).unwrap(), StartOutcome::Started);
        assert!(wait_until(Duration::from_secs(5), || {
            state.latest.lock().unwrap().as_ref().map(|p| p.frame_number) >= Some(3)
        }));
        assert_eq!(stop_stream(&state).unwrap(), StopOutcome::Stopped);

        let ledger = state.ledger.lock().unwrap();
        assert_eq!(ledger.total_detections(), 0);
        assert!(ledger.log_snapshot(false).is_empty());
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn notifier_failure_does_not_stop_the_pump() {
        struct FailingNotifier;
        impl Notifier for FailingNotifier {
            fn notify(&mut self, _alert: &AlertPayload) -> Result<(), NotifyError> {
                Err(NotifyError::Transport("unreachable".to_string()))
            }
            fn name(&self) -> &'static str {
                "failing"
            }
        }

        let detector = Box::new(ScriptedDetector::new(
            &["knife"],
            vec![vec![knife(0.9)], vec![], vec![]],
        ));
        let config = test_config();
        let source_config = config.source_config();
        let factory: SourceFactory =
            Box::new(move || Box::new(SyntheticSource::new(source_config)));
        let state = PipelineState::with_source_factory(
            config,
            detector,
            Box::new(FailingNotifier),
            factory,
        );

        assert_eq!(start_stream(&state).unwrap(), StartOutcome::Started);
        assert!(wait_until(Duration::from_secs(5), || {
            state.latest.lock().unwrap().as_ref().map(|p| p.frame_number) >= Some(4)
        }));
        assert!(state.control.is_running());
        assert_eq!(stop_stream(&state).unwrap(), StopOutcome::Stopped);

        let ledger = state.ledger.lock().unwrap();
        let log = ledger.log_snapshot(false);
        assert_eq!(log.len(), 1);
        // Delivery failed, so the event keeps alert_sent = false.
        assert!(!log[0].alert_sent);
    }
}
