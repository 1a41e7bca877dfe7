//! Alert decisions and delivery. The throttler gates on confidence and a
//! per-class cooldown, then hands the payload to a [`Notifier`]. Delivery
//! failures are logged and suppressed; they never surface as pipeline errors
//! and never advance the cooldown clock.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Upper bound on a single delivery attempt.
pub(crate) const NOTIFY_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Payload handed to the delivery transport.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct AlertPayload {
    pub(crate) class: String,
    pub(crate) confidence: f32,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) location: String,
}

#[derive(Debug, Error)]
pub(crate) enum NotifyError {
    #[error("alert delivery timed out")]
    Timeout,
    #[error("alert endpoint returned status {status}")]
    Status { status: u16 },
    #[error("alert delivery failed: {0}")]
    Transport(String),
}

/// Alert delivery transport. Implementations must respond within
/// [`NOTIFY_TIMEOUT`] or report failure.
pub(crate) trait Notifier: Send {
    fn notify(&mut self, alert: &AlertPayload) -> Result<(), NotifyError>;

    /// Transport name for logs.
    fn name(&self) -> &'static str;
}

/// Posts the alert payload as JSON to a configured endpoint.
pub(crate) struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub(crate) fn new(url: String) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .context("failed to build alert webhook client")?;
        Ok(Self { client, url })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&mut self, alert: &AlertPayload) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    NotifyError::Timeout
                } else {
                    NotifyError::Transport(err.to_string())
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Fallback transport when no webhook is configured: delivery lands in the
/// structured log, and counts as delivered so the cooldown still applies.
pub(crate) struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, alert: &AlertPayload) -> Result<(), NotifyError> {
        warn!(
            class = %alert.class,
            confidence = alert.confidence,
            location = %alert.location,
            "ALERT (log delivery; configure --alert-webhook for outbound alerts)"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Why an alert was not delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum SuppressReason {
    BelowThreshold,
    Cooldown,
    Delivery(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum AlertOutcome {
    Sent,
    Suppressed(SuppressReason),
}

/// Per-class alert gate. The last-alert clock only advances on successful
/// delivery, so a failed attempt may be retried by the very next detection.
pub(crate) struct AlertThrottler {
    threshold: f32,
    cooldown: Duration,
    last_alert: HashMap<String, DateTime<Utc>>,
    notifier: Box<dyn Notifier>,
}

impl AlertThrottler {
    pub(crate) fn new(threshold: f32, cooldown_secs: u64, notifier: Box<dyn Notifier>) -> Self {
        // Capped at a year; chrono durations overflow far below u64::MAX.
        let cooldown_secs = cooldown_secs.min(31_536_000) as i64;
        Self {
            threshold,
            cooldown: Duration::seconds(cooldown_secs),
            last_alert: HashMap::new(),
            notifier,
        }
    }

    pub(crate) fn maybe_alert(
        &mut self,
        class: &str,
        confidence: f32,
        timestamp: DateTime<Utc>,
        location: &str,
    ) -> AlertOutcome {
        if confidence < self.threshold {
            metrics::counter!("watchpost_alerts_total", "outcome" => "below_threshold").increment(1);
            return AlertOutcome::Suppressed(SuppressReason::BelowThreshold);
        }

        if let Some(last) = self.last_alert.get(class) {
            if timestamp.signed_duration_since(*last) < self.cooldown {
                metrics::counter!("watchpost_alerts_total", "outcome" => "cooldown").increment(1);
                return AlertOutcome::Suppressed(SuppressReason::Cooldown);
            }
        }

        let payload = AlertPayload {
            class: class.to_string(),
            confidence,
            timestamp,
            location: location.to_string(),
        };
        match self.notifier.notify(&payload) {
            Ok(()) => {
                self.last_alert.insert(class.to_string(), timestamp);
                metrics::counter!("watchpost_alerts_total", "outcome" => "sent").increment(1);
                info!(
                    class = %class,
                    confidence,
                    transport = self.notifier.name(),
                    "alert delivered"
                );
                AlertOutcome::Sent
            }
            Err(err) => {
                metrics::counter!("watchpost_alerts_total", "outcome" => "delivery_failed")
                    .increment(1);
                warn!(
                    class = %class,
                    transport = self.notifier.name(),
                    "alert delivery failed: {err}"
                );
                AlertOutcome::Suppressed(SuppressReason::Delivery(err.to_string()))
            }
        }
    }
}
