//! In-memory detection state: the rolling event log, the current-frame
//! snapshot, and the aggregate counters behind the dashboard endpoints.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use detect_core::RawDetection;

/// Bounded event history; the oldest entry is evicted on overflow.
pub(crate) const EVENT_LOG_CAPACITY: usize = 100;

const HIGH_CONFIDENCE: f32 = 0.8;
const MEDIUM_CONFIDENCE: f32 = 0.6;

/// Severity band derived from confidence, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub(crate) fn from_confidence(confidence: f32) -> Self {
        if confidence >= HIGH_CONFIDENCE {
            Severity::High
        } else if confidence >= MEDIUM_CONFIDENCE {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Lowercase label used on event log entries.
    pub(crate) fn as_status(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    /// Capitalized label used for the dashboard threat level.
    pub(crate) fn as_threat_level(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

/// One finalized detection. `alert_sent` flips false to true at most once,
/// within the same pipeline cycle that created the event.
#[derive(Clone, Debug)]
pub(crate) struct DetectionEvent {
    pub(crate) id: u64,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) object_class: String,
    pub(crate) confidence: f32,
    pub(crate) location: String,
    pub(crate) alert_sent: bool,
}

impl DetectionEvent {
    pub(crate) fn severity(&self) -> Severity {
        Severity::from_confidence(self.confidence)
    }
}

/// Aggregate counters served by the stats endpoint.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LedgerStats {
    pub(crate) total_detections: u64,
    pub(crate) uptime_hours: f64,
    pub(crate) threat_level: Severity,
    pub(crate) current_detections: usize,
}

/// Process-wide detection state. Mutated only by the pump thread; everyone
/// else reads copies.
pub(crate) struct DetectionLedger {
    events: VecDeque<DetectionEvent>,
    current: Vec<RawDetection>,
    total_detections: u64,
    started_at: DateTime<Utc>,
}

impl DetectionLedger {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            events: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
            current: Vec::new(),
            total_detections: 0,
            started_at,
        }
    }

    /// Records one processed frame: replaces the current-frame snapshot and
    /// appends an event per detection. Returns the new event ids in input
    /// order so the caller can write back alert outcomes.
    pub(crate) fn record_frame(
        &mut self,
        detections: &[RawDetection],
        timestamp: DateTime<Utc>,
        location: &str,
    ) -> Vec<u64> {
        self.current = detections.to_vec();

        let mut ids = Vec::with_capacity(detections.len());
        for detection in detections {
            self.total_detections += 1;
            let id = self.total_detections;
            self.events.push_back(DetectionEvent {
                id,
                timestamp,
                object_class: detection.label.clone(),
                confidence: detection.confidence,
                location: location.to_string(),
                alert_sent: false,
            });
            if self.events.len() > EVENT_LOG_CAPACITY {
                self.events.pop_front();
            }
            ids.push(id);
        }
        ids
    }

    /// Marks the alert as delivered on a live event. Returns false when the
    /// event has already been evicted.
    pub(crate) fn mark_alert_sent(&mut self, id: u64) -> bool {
        match self.events.iter_mut().rev().find(|event| event.id == id) {
            Some(event) => {
                event.alert_sent = true;
                true
            }
            None => false,
        }
    }

    /// Detections from the most recently processed frame.
    pub(crate) fn current_snapshot(&self) -> Vec<RawDetection> {
        self.current.clone()
    }

    /// Event log copy, oldest-first unless `newest_first` is set.
    pub(crate) fn log_snapshot(&self, newest_first: bool) -> Vec<DetectionEvent> {
        if newest_first {
            self.events.iter().rev().cloned().collect()
        } else {
            self.events.iter().cloned().collect()
        }
    }

    /// Counters and the threat level derived from the current frame only.
    pub(crate) fn stats(&self, now: DateTime<Utc>) -> LedgerStats {
        let threat_level = self
            .current
            .iter()
            .map(|det| Severity::from_confidence(det.confidence))
            .max()
            .unwrap_or(Severity::Low);

        let uptime_ms = now.signed_duration_since(self.started_at).num_milliseconds();
        let uptime_hours = (uptime_ms.max(0) as f64 / 3_600_000.0 * 100.0).round() / 100.0;

        LedgerStats {
            total_detections: self.total_detections,
            uptime_hours,
            threat_level,
            current_detections: self.current.len(),
        }
    }

    pub(crate) fn total_detections(&self) -> u64 {
        self.total_detections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn det(label: &str, confidence: f32) -> RawDetection {
        RawDetection::new(0, label, confidence, [10.0, 10.0, 40.0, 30.0])
    }

    fn ledger() -> DetectionLedger {
        DetectionLedger::new(Utc::now())
    }

    #[test]
    fn current_snapshot_is_fully_replaced_each_frame() {
        let mut ledger = ledger();
        let now = Utc::now();
        ledger.record_frame(&[det("knife", 0.9), det("pistol", 0.7)], now, "CCTV-1");
        assert_eq!(ledger.current_snapshot().len(), 2);

        ledger.record_frame(&[det("rifle", 0.8)], now, "CCTV-1");
        let current = ledger.current_snapshot();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].label, "rifle");

        ledger.record_frame(&[], now, "CCTV-1");
        assert!(ledger.current_snapshot().is_empty());
        // The log accumulates while the snapshot does not.
        assert_eq!(ledger.total_detections(), 3);
        assert_eq!(ledger.log_snapshot(false).len(), 3);
    }

    #[test]
    fn event_ids_are_monotonic_and_returned_in_order() {
        let mut ledger = ledger();
        let now = Utc::now();
        let first = ledger.record_frame(&[det("knife", 0.9), det("knife", 0.6)], now, "CCTV-1");
        let second = ledger.record_frame(&[det("pistol", 0.8)], now, "CCTV-1");
        assert_eq!(first, vec![1, 2]);
        assert_eq!(second, vec![3]);
    }

    #[test]
    fn log_is_capped_while_totals_keep_counting() {
        let mut ledger = ledger();
        let now = Utc::now();
        for _ in 0..(EVENT_LOG_CAPACITY + 25) {
            ledger.record_frame(&[det("knife", 0.9)], now, "CCTV-1");
        }
        let log = ledger.log_snapshot(false);
        assert_eq!(log.len(), EVENT_LOG_CAPACITY);
        assert_eq!(ledger.total_detections(), (EVENT_LOG_CAPACITY + 25) as u64);
        // The oldest 25 events were evicted.
        assert_eq!(log.first().unwrap().id, 26);
        assert_eq!(log.last().unwrap().id, (EVENT_LOG_CAPACITY + 25) as u64);
    }

    #[test]
    fn severity_boundaries() {
        assert_eq!(Severity::from_confidence(0.80), Severity::High);
        assert_eq!(Severity::from_confidence(0.79), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.60), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.59), Severity::Low);
        assert_eq!(Severity::from_confidence(0.0), Severity::Low);
    }

    #[test]
    fn threat_level_tracks_only_the_current_frame() {
        let mut ledger = ledger();
        let now = Utc::now();
        ledger.record_frame(&[], now, "CCTV-1");
        ledger.record_frame(&[det("knife", 0.9)], now, "CCTV-1");
        ledger.record_frame(&[], now, "CCTV-1");

        let stats = ledger.stats(now);
        assert_eq!(stats.total_detections, 1);
        assert_eq!(stats.current_detections, 0);
        assert_eq!(stats.threat_level, Severity::Low);
    }

    #[test]
    fn threat_level_uses_the_highest_current_confidence() {
        let mut ledger = ledger();
        let now = Utc::now();
        ledger.record_frame(&[det("knife", 0.65), det("pistol", 0.85)], now, "CCTV-1");
        assert_eq!(ledger.stats(now).threat_level, Severity::High);

        ledger.record_frame(&[det("knife", 0.65)], now, "CCTV-1");
        assert_eq!(ledger.stats(now).threat_level, Severity::Medium);
    }

    #[test]
    fn mark_alert_sent_targets_the_recorded_event() {
        let mut ledger = ledger();
        let now = Utc::now();
        let ids = ledger.record_frame(&[det("knife", 0.9), det("pistol", 0.9)], now, "CCTV-1");
        assert!(ledger.mark_alert_sent(ids[1]));

        let log = ledger.log_snapshot(false);
        assert!(!log[0].alert_sent);
        assert!(log[1].alert_sent);
        // Unknown or evicted ids are reported, not panicked on.
        assert!(!ledger.mark_alert_sent(999));
    }

    #[test]
    fn uptime_rounds_to_two_decimals() {
        let started = Utc::now();
        let ledger = DetectionLedger::new(started);
        let stats = ledger.stats(started + Duration::minutes(90));
        assert_eq!(stats.uptime_hours, 1.5);

        let stats = ledger.stats(started + Duration::seconds(40));
        assert_eq!(stats.uptime_hours, 0.01);
    }

    #[test]
    fn log_snapshot_honors_requested_order() {
        let mut ledger = ledger();
        let now = Utc::now();
        ledger.record_frame(&[det("knife", 0.9)], now, "CCTV-1");
        ledger.record_frame(&[det("pistol", 0.9)], now, "CCTV-1");

        let oldest_first = ledger.log_snapshot(false);
        assert_eq!(oldest_first[0].id, 1);
        let newest_first = ledger.log_snapshot(true);
        assert_eq!(newest_first[0].id, 2);
    }
}
