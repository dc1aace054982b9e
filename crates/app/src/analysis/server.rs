//! Actix Web API exposing capture triggering, the latest result and runtime
//! settings.
//!
//! The server runs on a dedicated thread with its own actix `System`. Capture
//! triggers are pushed onto the blocking pool so the async workers keep
//! answering reads while a still capture and analysis are in flight.

use std::{sync::Arc, sync::mpsc, time::Duration};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::{Method, header},
    middleware::DefaultHeaders,
    web::{self, Bytes},
};
use anyhow::{Context, Result, anyhow};
use async_stream::stream;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::analysis::{
    capture::CaptureOrchestrator,
    config::RuntimeSettings,
    data::{
        AnalysisResult, CaptureResponse, ErrorResponse, ImageResponse, LatestResponse,
        StatusResponse,
    },
    encoding::to_base64,
    error::TriggerError,
    telemetry,
};

pub(crate) const BANNER: &str = "RebarVista API is running!";
const STREAM_POLL: Duration = Duration::from_millis(250);
/// Poll ticks between keep-alive comments on an idle stream.
const KEEP_ALIVE_TICKS: u32 = 60;

/// Shared state backing HTTP handlers.
pub(crate) struct ApiState {
    pub(crate) orchestrator: Arc<CaptureOrchestrator>,
}

/// Handle for the API server thread.
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

#[derive(Serialize)]
struct ConfigUpdated<'a> {
    message: &'static str,
    config: &'a RuntimeSettings,
}

/// Spawn the API server thread and wait until it is listening.
pub(crate) fn spawn_api_server(
    orchestrator: Arc<CaptureOrchestrator>,
    bind: String,
    port: u16,
) -> Result<ApiServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (ready_tx, ready_rx) = mpsc::sync_channel::<std::io::Result<()>>(1);
    let address = format!("{bind}:{port}");
    let handle = telemetry::spawn_thread("rebar-api-server", move || {
        if let Err(err) = actix_web::rt::System::new().block_on(async move {
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(ApiState {
                        orchestrator: orchestrator.clone(),
                    }))
                    .wrap(cors_headers())
                    .configure(routes)
            })
            .bind((bind.as_str(), port));
            let server = match server {
                Ok(server) => {
                    let _ = ready_tx.send(Ok(()));
                    server.run()
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(std::io::Error::new(err.kind(), err.to_string())));
                    return Err(err);
                }
            };

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
    .context("Failed to spawn API server thread")?;

    match ready_rx.recv() {
        Ok(Ok(())) => info!("API listening on http://{address}"),
        Ok(Err(err)) => {
            let _ = handle.join();
            return Err(err).with_context(|| format!("Failed to bind API server to {address}"));
        }
        Err(_) => {
            let _ = handle.join();
            return Err(anyhow!("API server thread exited before binding {address}"));
        }
    }

    Ok(ApiServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

pub(crate) fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .add((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
        .add((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"))
}

pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/api/status", web::get().to(status_handler))
        .route("/api/latest", web::get().to(latest_handler))
        .route("/api/latest_image", web::get().to(latest_image_handler))
        .route("/api/stream", web::get().to(stream_handler))
        .service(
            web::resource("/api/capture")
                .route(web::post().to(capture_handler))
                .route(web::method(Method::OPTIONS).to(preflight)),
        )
        .service(
            web::resource("/api/config")
                .route(web::get().to(get_config_handler))
                .route(web::post().to(update_config_handler))
                .route(web::method(Method::OPTIONS).to(preflight)),
        );
}

async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(BANNER)
}

async fn preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().json(ErrorResponse {
            error: "metrics recorder not installed".into(),
        }),
    }
}

async fn status_handler(state: web::Data<ApiState>) -> HttpResponse {
    let orchestrator = &state.orchestrator;
    HttpResponse::Ok().json(StatusResponse {
        status: "online",
        camera_available: orchestrator.camera().is_available(),
        has_results: orchestrator.state().read().is_some(),
        capturing: orchestrator.state().is_capturing(),
    })
}

/// Return the latest analysis summary; the empty shape when nothing ran yet.
async fn latest_handler(state: web::Data<ApiState>) -> HttpResponse {
    let latest = state.orchestrator.state().read();
    HttpResponse::Ok().json(LatestResponse::from_result(latest.as_deref()))
}

async fn latest_image_handler(state: web::Data<ApiState>) -> HttpResponse {
    let latest = state.orchestrator.state().read();
    match latest.as_ref().and_then(|result| result.annotated_jpeg.as_deref()) {
        Some(jpeg) => HttpResponse::Ok().json(ImageResponse {
            image: to_base64(jpeg),
        }),
        None => HttpResponse::NotFound().json(ErrorResponse {
            error: "No image available".into(),
        }),
    }
}

async fn capture_handler(state: web::Data<ApiState>) -> HttpResponse {
    let orchestrator = state.orchestrator.clone();
    let outcome = match web::block(move || orchestrator.trigger()).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Capture task did not complete: {err}");
            return HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Capture task did not complete".into(),
            });
        }
    };

    match outcome {
        Ok(outcome) => HttpResponse::Ok().json(CaptureResponse {
            message: "Capture and analysis successful",
            timestamp: outcome.result.timestamp.clone(),
            segments_count: outcome.result.segments.len(),
            artifacts: outcome
                .artifacts
                .as_ref()
                .ok()
                .map(|path| path.display().to_string()),
            persist_error: outcome.artifacts.as_ref().err().map(|err| err.to_string()),
        }),
        Err(err @ TriggerError::CaptureAlreadyInProgress) => {
            HttpResponse::Conflict().json(ErrorResponse {
                error: err.to_string(),
            })
        }
        Err(err) => HttpResponse::InternalServerError().json(ErrorResponse {
            error: err.to_string(),
        }),
    }
}

async fn get_config_handler(state: web::Data<ApiState>) -> HttpResponse {
    let settings = state.orchestrator.pipeline().settings().snapshot();
    HttpResponse::Ok().json(&settings.raw)
}

async fn update_config_handler(
    state: web::Data<ApiState>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    match state.orchestrator.pipeline().settings().update(&body) {
        Ok(active) => HttpResponse::Ok().json(ConfigUpdated {
            message: "Configuration updated successfully",
            config: &active.raw,
        }),
        Err(err) => {
            warn!("Rejected configuration update: {err:#}");
            HttpResponse::BadRequest().json(ErrorResponse {
                error: format!("Error updating configuration: {err:#}"),
            })
        }
    }
}

fn sse_chunk(result: &AnalysisResult) -> String {
    match serde_json::to_string(&LatestResponse::from_result(Some(result))) {
        Ok(json) => format!("id: {}\ndata: {}\n\n", result.timestamp, json),
        Err(err) => format!("event: error\ndata: {err}\n\n"),
    }
}

/// Push each newly committed result as a Server-Sent Event.
async fn stream_handler(state: web::Data<ApiState>) -> HttpResponse {
    let state = state.clone();
    let stream = stream! {
        yield Ok::<Bytes, actix_web::Error>(Bytes::from_static(b"retry: 1000\n\n"));
        let mut last_sent: Option<Arc<AnalysisResult>> = None;
        let mut idle_ticks: u32 = 0;
        let mut interval = actix_web::rt::time::interval(STREAM_POLL);
        loop {
            interval.tick().await;
            let latest = state.orchestrator.state().read();
            let fresh = match (&latest, &last_sent) {
                (Some(latest), Some(sent)) => !Arc::ptr_eq(latest, sent),
                (Some(_), None) => true,
                (None, _) => false,
            };
            if fresh {
                if let Some(result) = latest {
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from(sse_chunk(&result)));
                    last_sent = Some(result);
                }
                idle_ticks = 0;
            } else {
                idle_ticks += 1;
                if idle_ticks >= KEEP_ALIVE_TICKS {
                    idle_ticks = 0;
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from_static(b": keep-alive\n\n"));
                }
            }
        }
    };

    HttpResponse::Ok()
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "text/event-stream"))
        .append_header(("Connection", "keep-alive"))
        .streaming(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::capture::tests::{ScriptedCamera, orchestrator_with};
    use actix_web::{http::StatusCode, test as actix_test};
    use serde_json::{Value, json};

    fn api_state() -> web::Data<ApiState> {
        web::Data::new(ApiState {
            orchestrator: Arc::new(orchestrator_with(ScriptedCamera::ok())),
        })
    }

    macro_rules! app {
        ($state:expr) => {
            actix_test::init_service(
                App::new()
                    .app_data($state.clone())
                    .wrap(cors_headers())
                    .configure(routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn index_reports_liveness_with_cors() {
        let state = api_state();
        let app = app!(state);
        let req = actix_test::TestRequest::get().uri("/").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
        let body = actix_test::read_body(resp).await;
        assert_eq!(body, Bytes::from_static(BANNER.as_bytes()));
    }

    #[actix_web::test]
    async fn empty_slot_has_null_shape_and_no_image() {
        let state = api_state();
        let app = app!(state);

        let req = actix_test::TestRequest::get().uri("/api/latest").to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body,
            json!({ "timestamp": null, "segments": [], "total_volume": 0.0, "image_available": false })
        );

        let req = actix_test::TestRequest::get().uri("/api/latest_image").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = actix_test::read_body_json(resp).await;
        assert_eq!(body, json!({ "error": "No image available" }));
    }

    #[actix_web::test]
    async fn capture_publishes_a_result() {
        let state = api_state();
        let app = app!(state);

        let req = actix_test::TestRequest::post().uri("/api/capture").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["message"], "Capture and analysis successful");
        assert_eq!(body["segments_count"], 1);
        assert!(body.get("persist_error").is_none());

        let req = actix_test::TestRequest::get().uri("/api/latest").to_request();
        let latest: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(latest["timestamp"], body["timestamp"]);
        assert_eq!(latest["total_volume"], 1500.0);
        assert_eq!(latest["segments"][0]["section_id"], 1);
        assert_eq!(latest["image_available"], true);

        let req = actix_test::TestRequest::get().uri("/api/latest_image").to_request();
        let image: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert!(image["image"].as_str().unwrap().starts_with("/9j/"));

        let req = actix_test::TestRequest::get().uri("/api/status").to_request();
        let status: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            status,
            json!({ "status": "online", "camera_available": true, "has_results": true, "capturing": false })
        );
    }

    #[actix_web::test]
    async fn capture_in_progress_is_a_conflict() {
        let state = api_state();
        let app = app!(state);
        assert!(state.orchestrator.state().begin_capture());

        let req = actix_test::TestRequest::post().uri("/api/capture").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(state.orchestrator.state().read().is_none());
        state.orchestrator.state().end_capture();
    }

    #[actix_web::test]
    async fn config_updates_are_validated_and_applied() {
        let state = api_state();
        let app = app!(state);

        let req = actix_test::TestRequest::get().uri("/api/config").to_request();
        let config: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(config["detection_threshold"], json!(0.7));
        assert_eq!(config["cement_ratios"]["small"]["diameter_range"], json!([6.0, 12.0]));

        let req = actix_test::TestRequest::post()
            .uri("/api/config")
            .set_json(json!({ "detection_threshold": 2.5 }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = actix_test::TestRequest::post()
            .uri("/api/config")
            .set_json(json!({ "detection_threshold": 0.95, "unknown": true }))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["message"], "Configuration updated successfully");
        assert_eq!(body["config"]["detection_threshold"], json!(0.95));
        assert!(body["config"].get("unknown").is_none());

        // The only fixed detection scores 0.9, below the new threshold.
        let req = actix_test::TestRequest::post().uri("/api/capture").to_request();
        let capture: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(capture["segments_count"], 0);
    }

    #[actix_web::test]
    async fn preflight_is_answered() {
        let state = api_state();
        let app = app!(state);
        let req = actix_test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/api/capture")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(resp.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    }

    #[test]
    fn sse_chunks_carry_the_summary() {
        let result = AnalysisResult {
            timestamp: "20240102-030405".into(),
            segments: Vec::new(),
            total_volume_cc: 0.0,
            annotated_jpeg: None,
            frame_size: (1, 1),
            detector: "test".into(),
        };
        let chunk = sse_chunk(&result);
        assert!(chunk.starts_with("id: 20240102-030405\ndata: {"));
        assert!(chunk.ends_with("}\n\n"));
        assert!(chunk.contains("\"image_available\":false"));
    }
}
