//! Actix Web API server: the MJPEG feed, the control endpoints, and the
//! dashboard read endpoints over ledger snapshots.
//!
//! The server runs on a dedicated thread so the pump thread never touches
//! the actix runtime. Handlers only read copies of pipeline state; the two
//! control endpoints go through the control plane like any other caller.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{
    http::header,
    web::{self, Bytes},
    App, HttpResponse, HttpServer,
};
use anyhow::{Context, Result};
use async_stream::stream;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::error;

use crate::html;
use crate::pipeline::control::{self, StartOutcome, StopOutcome};
use crate::pipeline::data::{
    ActionResponse, DetectionDto, DetectionsResponse, HealthResponse, LogEntryDto, LogsResponse,
    PipelineState, StatsResponse, StatusResponse,
};
use crate::pipeline::telemetry;

/// Handle for the API server thread.
#[derive(Default)]
pub(crate) struct ApiServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ApiServer {
    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(self) {
        if let Some(tx) = self.shutdown {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle {
            let _ = handle.join();
        }
    }
}

/// Spawn the API server thread and return a handle that can stop it.
pub(crate) fn spawn_server(state: Arc<PipelineState>) -> Result<ApiServer> {
    let port = state.config.port;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = telemetry::spawn_thread("watchpost-api", move || {
        if let Err(err) = actix_web::rt::System::new().block_on(async move {
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::from(state.clone()))
                    .configure(configure_app)
            })
            .bind(("0.0.0.0", port))?
            .run();

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        }) {
            error!("HTTP server error: {err}");
        }
    })
    .context("failed to spawn API server thread")?;
    Ok(ApiServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

/// Route table shared by the server and the handler tests.
pub(crate) fn configure_app(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/api/video_feed", web::get().to(video_feed))
        .route("/api/start_stream", web::post().to(start_stream_route))
        .route("/api/stop_stream", web::post().to(stop_stream_route))
        .route("/api/status", web::get().to(status_route))
        .route("/api/health", web::get().to(health_route))
        .route("/api/detections", web::get().to(detections_route))
        .route("/api/logs", web::get().to(logs_route))
        .route("/api/stats", web::get().to(stats_route))
        .route("/metrics", web::get().to(metrics_route));
}

/// Serve the embedded operator dashboard.
async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html::dashboard::DASHBOARD_HTML)
}

/// Stream the annotated feed over a multipart response. Parts are emitted
/// only when the pump publishes a new frame number; the stream ends when the
/// pump stops after having served at least one part.
async fn video_feed(state: web::Data<PipelineState>) -> HttpResponse {
    let state = state.into_inner();
    let stream = stream! {
        let mut interval = actix_web::rt::time::interval(Duration::from_millis(33));
        let mut last_sent: Option<u64> = None;
        loop {
            interval.tick().await;
            if !state.control.is_running() {
                if last_sent.is_some() {
                    break;
                }
                continue;
            }
            let packet = state.latest.lock().ok().and_then(|guard| guard.clone());
            if let Some(packet) = packet {
                if last_sent == Some(packet.frame_number) {
                    continue;
                }
                last_sent = Some(packet.frame_number);
                let mut payload = Vec::with_capacity(packet.jpeg.len() + 64);
                payload.extend_from_slice(b"--frame\r\n");
                payload.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
                payload.extend_from_slice(&packet.jpeg);
                payload.extend_from_slice(b"\r\n");
                yield Ok::<Bytes, actix_web::Error>(Bytes::from(payload));
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "multipart/x-mixed-replace; boundary=frame"))
        .streaming(stream)
}

async fn start_stream_route(state: web::Data<PipelineState>) -> HttpResponse {
    let state = state.into_inner();
    match control::start_stream(&state) {
        Ok(StartOutcome::Started) => {
            HttpResponse::Ok().json(ActionResponse::success("Stream started"))
        }
        Ok(StartOutcome::AlreadyRunning) => {
            HttpResponse::Ok().json(ActionResponse::success("Stream already running"))
        }
        Err(err) => HttpResponse::InternalServerError()
            .json(ActionResponse::error(format!("Failed to start stream: {err:#}"))),
    }
}

async fn stop_stream_route(state: web::Data<PipelineState>) -> HttpResponse {
    let state = state.into_inner();
    match control::stop_stream(&state) {
        Ok(StopOutcome::Stopped) => {
            HttpResponse::Ok().json(ActionResponse::success("Stream stopped"))
        }
        Ok(StopOutcome::NotRunning) => {
            HttpResponse::Ok().json(ActionResponse::success("Stream is not running"))
        }
        Err(err) => HttpResponse::InternalServerError()
            .json(ActionResponse::error(format!("Failed to stop stream: {err:#}"))),
    }
}

async fn status_route(state: web::Data<PipelineState>) -> HttpResponse {
    use std::sync::atomic::Ordering;
    HttpResponse::Ok().json(StatusResponse {
        is_streaming: state.control.is_running(),
        model_loaded: state.model_ready.load(Ordering::SeqCst),
        camera_active: state.source_active.load(Ordering::SeqCst),
    })
}

async fn health_route() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse { status: "healthy" })
}

/// Current-frame detection snapshot.
async fn detections_route(state: web::Data<PipelineState>) -> HttpResponse {
    let current = match state.ledger.lock() {
        Ok(ledger) => ledger.current_snapshot(),
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    let detections: Vec<DetectionDto> = current.iter().map(DetectionDto::from).collect();
    let count = detections.len();
    HttpResponse::Ok().json(DetectionsResponse { detections, count })
}

#[derive(Deserialize)]
struct LogsQuery {
    order: Option<String>,
}

/// Event-log snapshot, oldest-first unless `?order=desc`.
async fn logs_route(
    query: web::Query<LogsQuery>,
    state: web::Data<PipelineState>,
) -> HttpResponse {
    let newest_first = query.order.as_deref() == Some("desc");
    let events = match state.ledger.lock() {
        Ok(ledger) => ledger.log_snapshot(newest_first),
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    let logs: Vec<LogEntryDto> = events.iter().map(LogEntryDto::from).collect();
    let total = logs.len();
    HttpResponse::Ok().json(LogsResponse { logs, total })
}

async fn stats_route(state: web::Data<PipelineState>) -> HttpResponse {
    let stats = match state.ledger.lock() {
        Ok(ledger) => ledger.stats(Utc::now()),
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    HttpResponse::Ok().json(StatsResponse::from_stats(stats, state.control.is_running()))
}

/// Prometheus exposition.
async fn metrics_route() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{body::to_bytes, test};
    use detect_core::{RawDetection, ScriptedDetector};
    use frame_source::{SourceConfig, SyntheticSource};

    use crate::pipeline::alerts::{AlertPayload, Notifier, NotifyError};
    use crate::pipeline::config::{PipelineConfig, ServeArgs};
    use crate::pipeline::data::SourceFactory;

    struct NullNotifier;

    impl Notifier for NullNotifier {
        fn notify(&mut self, _alert: &AlertPayload) -> Result<(), NotifyError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "null"
        }
    }

    fn test_state() -> Arc<PipelineState> {
        let mut config = PipelineConfig::try_from(ServeArgs::default()).unwrap();
        config.width = 64;
        config.height = 48;
        config.fps = 200;
        let source_config = SourceConfig {
            width: 64,
            height: 48,
            fps: 200,
        };
        let factory: SourceFactory =
            Box::new(move || Box::new(SyntheticSource::new(source_config)));
        PipelineState::with_source_factory(
            config,
            Box::new(ScriptedDetector::new(&["knife"], Vec::new())),
            Box::new(NullNotifier),
            factory,
        )
    }

    macro_rules! service {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::from($state))
                    .configure(configure_app),
            )
            .await
        };
    }

    fn record_knife(state: &Arc<PipelineState>, confidence: f32) -> Vec<u64> {
        let mut ledger = state.ledger.lock().unwrap();
        ledger.record_frame(
            &[RawDetection::new(0, "knife", confidence, [4.0, 4.0, 20.0, 16.0])],
            Utc::now(),
            "CCTV-1",
        )
    }

    #[actix_web::test]
    async fn health_reports_healthy() {
        let app = service!(test_state());
        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request())
            .await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
    }

    #[actix_web::test]
    async fn status_reflects_the_idle_session() {
        let app = service!(test_state());
        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/status").to_request())
            .await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["is_streaming"], false);
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["camera_active"], false);
    }

    #[actix_web::test]
    async fn detections_serve_the_current_frame_snapshot() {
        let state = test_state();
        record_knife(&state, 0.87);
        let app = service!(state);

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/api/detections").to_request())
                .await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["detections"][0]["class"], "knife");
        assert_eq!(body["detections"][0]["bbox"][2], 24.0);
    }

    #[actix_web::test]
    async fn logs_honor_the_order_parameter() {
        let state = test_state();
        record_knife(&state, 0.9);
        record_knife(&state, 0.7);
        let app = service!(state);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/logs").to_request())
            .await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["logs"][0]["id"], 1);
        assert_eq!(body["logs"][0]["status"], "high");
        assert_eq!(body["logs"][0]["email_sent"], false);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/logs?order=desc").to_request(),
        )
        .await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["logs"][0]["id"], 2);
    }

    #[actix_web::test]
    async fn stats_expose_the_ledger_counters() {
        let state = test_state();
        record_knife(&state, 0.7);
        let app = service!(state);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/stats").to_request())
            .await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["total_detections"], 1);
        assert_eq!(body["current_detections"], 1);
        assert_eq!(body["threat_level"], "Medium");
        assert_eq!(body["active_cameras"], 0);
    }

    #[actix_web::test]
    async fn start_and_stop_drive_the_session() {
        let state = test_state();
        let app = service!(state.clone());

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/start_stream").to_request(),
        )
        .await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "success");
        assert!(state.control.is_running());

        // Second start is a no-op success.
        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/start_stream").to_request(),
        )
        .await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Stream already running");

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/stop_stream").to_request(),
        )
        .await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "success");
        assert!(!state.control.is_running());
    }

    #[actix_web::test]
    async fn video_feed_is_a_multipart_stream() {
        let app = service!(test_state());
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/video_feed").to_request(),
        )
        .await;
        assert!(resp.status().is_success());
        let content_type = resp
            .headers()
            .get("Content-Type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert_eq!(content_type, "multipart/x-mixed-replace; boundary=frame");
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|value| value.to_str().ok()),
            Some("*")
        );
    }

    #[actix_web::test]
    async fn dashboard_serves_embedded_html() {
        let app = service!(test_state());
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert!(resp.status().is_success());
        let body = to_bytes(resp.into_body()).await.unwrap();
        let page = std::str::from_utf8(&body).unwrap();
        assert!(page.contains("/api/video_feed"));
        assert!(page.contains("/api/start_stream"));
    }
}
