//! End-to-end API tests against the in-memory store.
//!
//! Uploads are fake clips: each byte of the uploaded file becomes one frame
//! whose person count is that byte's value. Camera addresses containing
//! `offline` refuse to open; every other camera repeats a frame with two
//! people forever.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use cg_api::{create_router, ApiConfig, AppState};
use cg_media::{
    Detection, Frame, FrameSource, FrameSourceOpener, HandleTracker, MediaError, MediaResult,
    MemorySource, PersonDetector, SourceInput,
};
use cg_models::PhoneNumber;
use cg_notify::{AlertDispatcher, AlertPolicy, NotifyResult, SmsGateway};
use cg_store::{DocumentStore, MemoryStore};
use tokio::sync::{mpsc, watch};

const ACCOUNT: &str = "ops@gatehouse.in";
const OTHER_ACCOUNT: &str = "night@depot.in";
const BOUNDARY: &str = "crowdguard-test-boundary";

/// Reads the person count from the red channel of the top-left pixel.
struct PixelCountDetector;

impl PersonDetector for PixelCountDetector {
    fn name(&self) -> &'static str {
        "pixel"
    }

    fn detect(&self, frame: &Frame) -> MediaResult<Vec<Detection>> {
        let n = frame.image().get_pixel(0, 0)[0] as i32;
        Ok((0..n).map(|i| Detection::new(40 + i * 60, 120, 48, 160)).collect())
    }
}

/// Opens fake clips and cameras.
struct FakeOpener {
    handles: HandleTracker,
}

#[async_trait::async_trait]
impl FrameSourceOpener for FakeOpener {
    async fn open(&self, input: &SourceInput) -> MediaResult<Box<dyn FrameSource>> {
        match input {
            SourceInput::File(path) => {
                let bytes = tokio::fs::read(path).await?;
                if bytes.is_empty() || bytes.starts_with(b"BAD") {
                    return Err(MediaError::source_open_failed(
                        input.to_string(),
                        "invalid data found",
                    ));
                }
                let frames = bytes.iter().map(|&c| Frame::solid([c, 0, 0])).collect();
                Ok(Box::new(MemorySource::new(frames).tracked(&self.handles)))
            }
            SourceInput::Url(url) if url.contains("offline") => {
                Err(MediaError::source_open_failed(url.clone(), "connection refused"))
            }
            _ => Ok(Box::new(
                MemorySource::new(vec![Frame::solid([2, 0, 0])])
                    .repeating()
                    .with_label(input.to_string())
                    .tracked(&self.handles),
            )),
        }
    }
}

/// Forwards every text it is asked to send.
struct RecordingGateway {
    sent: mpsc::UnboundedSender<(String, String)>,
}

#[async_trait::async_trait]
impl SmsGateway for RecordingGateway {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, to: &PhoneNumber, message: &str) -> NotifyResult<()> {
        let _ = self.sent.send((to.to_string(), message.to_string()));
        Ok(())
    }
}

struct TestApp {
    router: Router,
    handles: HandleTracker,
    shutdown: watch::Sender<bool>,
}

fn app_with(policy: AlertPolicy, with_detector: bool) -> TestApp {
    app_from(ApiConfig::default(), policy, AlertDispatcher::logged_only(), with_detector)
}

fn app_from(
    config: ApiConfig,
    policy: AlertPolicy,
    dispatcher: AlertDispatcher,
    with_detector: bool,
) -> TestApp {
    let handles = HandleTracker::new();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let mut state = AppState::from_parts(config, store, Arc::new(dispatcher))
        .with_shutdown(shutdown_rx)
        .with_policy(policy)
        .with_handles(handles.clone())
        .with_sources(Arc::new(FakeOpener {
            handles: handles.clone(),
        }));
    if with_detector {
        state = state.with_detector(Arc::new(PixelCountDetector));
    }
    TestApp {
        router: create_router(state, None),
        handles,
        shutdown,
    }
}

fn app() -> TestApp {
    app_with(AlertPolicy::default(), true)
}

async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn feed(account: &str) -> Request<Body> {
    get(&format!("/api/video-feed/Gate%20A?user_email={account}"))
}

fn upload_request(gate: &str, account: Option<&str>, clip: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    let mut text_part = |name: &str, value: &str| {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    };
    text_part("gate", gate);
    if let Some(account) = account {
        text_part("user_email", account);
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"gate.mp4\"\r\n\
             Content-Type: video/mp4\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(clip);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/analyze-video")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn add_guard(router: &Router, account: &str, name: &str, mobile: &str, gate: &str) -> Value {
    let response = send(
        router,
        post_json(
            "/api/guards",
            json!({"user_email": account, "name": name, "mobile": mobile, "gate": gate}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

async fn add_camera(router: &Router, account: &str, gate: &str, url: &str) {
    let response = send(
        router,
        post_json(
            "/api/cameras",
            json!({"user_email": account, "gate": gate, "rtsp_url": url}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Upload analysis
// =============================================================================

#[tokio::test]
async fn test_upload_over_threshold_alerts_gate_guards() {
    let app = app();
    add_guard(&app.router, ACCOUNT, "Ravi", "9876543210", "Gate A").await;
    add_guard(&app.router, ACCOUNT, "Typo", "12345", "Gate A").await;
    add_guard(&app.router, ACCOUNT, "Elsewhere", "9123456780", "Gate B").await;

    let mut clip = vec![1, 1, 2, 4, 4, 3, 2];
    clip.resize(25, 1);
    // Beyond the 20-frame budget; must not be counted.
    clip[22] = 9;

    let response = send(&app.router, upload_request("Gate A", Some(ACCOUNT), &clip)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    assert_eq!(body["gate"], "Gate A");
    assert_eq!(body["crowdCount"], 4);
    assert_eq!(body["countSource"], "measured");
    assert_eq!(body["framesProcessed"], 20);
    assert_eq!(body["threshold"], 3);
    assert_eq!(body["thresholdExceeded"], true);
    assert_eq!(body["messagesSent"], json!(["Ravi (9876543210)"]));
    assert_eq!(body["dispatch"][0]["mode"], "logged_only");
    assert_eq!(body["dispatch"][0]["delivered"], true);
    assert_eq!(body["filename"], "gate.mp4");
    assert_eq!(app.handles.open_handles(), 0);
}

#[tokio::test]
async fn test_empty_scene_reports_true_zero() {
    let app = app();
    add_guard(&app.router, ACCOUNT, "Ravi", "9876543210", "Gate A").await;

    let response = send(&app.router, upload_request("Gate A", Some(ACCOUNT), &[0; 8])).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    assert_eq!(body["crowdCount"], 0);
    assert_eq!(body["countSource"], "measured");
    assert_eq!(body["framesProcessed"], 8);
    assert_eq!(body["thresholdExceeded"], false);
    assert_eq!(body["messagesSent"], json!([]));
}

#[tokio::test]
async fn test_fallback_estimate_is_labelled() {
    let policy = AlertPolicy {
        fallback_estimate: Some(5),
        ..AlertPolicy::default()
    };
    let app = app_with(policy, true);
    add_guard(&app.router, ACCOUNT, "Ravi", "9876543210", "Gate A").await;

    let response = send(&app.router, upload_request("Gate A", Some(ACCOUNT), &[0; 4])).await;
    let body = json_body(response).await;
    assert_eq!(body["crowdCount"], 5);
    assert_eq!(body["countSource"], "fallback_estimated");
    assert_eq!(body["thresholdExceeded"], true);

    // A measured count is never replaced.
    let response = send(&app.router, upload_request("Gate A", Some(ACCOUNT), &[1, 2])).await;
    let body = json_body(response).await;
    assert_eq!(body["crowdCount"], 2);
    assert_eq!(body["countSource"], "measured");
}

#[tokio::test]
async fn test_gate_threshold_overrides_default() {
    let app = app();
    add_guard(&app.router, ACCOUNT, "Ravi", "9876543210", "Gate A").await;

    let request = Request::builder()
        .method("PUT")
        .uri("/api/gates/Gate%20A/settings")
        .header("X-Account-Id", ACCOUNT)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"alert_threshold": 10}).to_string()))
        .unwrap();
    let response = send(&app.router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["overridden"], true);

    let response = send(&app.router, upload_request("Gate A", Some(ACCOUNT), &[4, 4, 6])).await;
    let body = json_body(response).await;
    assert_eq!(body["crowdCount"], 6);
    assert_eq!(body["threshold"], 10);
    assert_eq!(body["thresholdExceeded"], false);

    // Other gates and other accounts keep the default.
    let body = json_body(
        send(&app.router, get(&format!("/api/gates/Gate%20B/settings?user_email={ACCOUNT}"))).await,
    )
    .await;
    assert_eq!(body["alert_threshold"], 3);
    assert_eq!(body["overridden"], false);

    let body = json_body(
        send(
            &app.router,
            get(&format!("/api/gates/Gate%20A/settings?user_email={OTHER_ACCOUNT}")),
        )
        .await,
    )
    .await;
    assert_eq!(body["alert_threshold"], 3);
}

#[tokio::test]
async fn test_over_threshold_without_guards_succeeds_with_no_messages() {
    let app = app();
    add_guard(&app.router, ACCOUNT, "Ravi", "9876543210", "Gate B").await;

    let response = send(&app.router, upload_request("Gate A", Some(ACCOUNT), &[5, 7, 6])).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    assert_eq!(body["crowdCount"], 7);
    assert_eq!(body["thresholdExceeded"], true);
    assert_eq!(body["messagesSent"], json!([]));
    assert_eq!(body["dispatch"], json!([]));
}

#[tokio::test]
async fn test_undecodable_upload_is_unprocessable() {
    let app = app();
    let response =
        send(&app.router, upload_request("Gate A", Some(ACCOUNT), b"BAD-NOT-A-VIDEO")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["detail"], "Uploaded video could not be decoded");
}

#[tokio::test]
async fn test_upload_requires_account_and_gate() {
    let app = app();
    let response = send(&app.router, upload_request("Gate A", None, &[1])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "validation_failed");
    assert_eq!(body["detail"], "user_email is required");

    let response = send(&app.router, upload_request("", Some(ACCOUNT), &[1])).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analysis_without_detector_is_unavailable() {
    let app = app_with(AlertPolicy::default(), false);
    let response = send(&app.router, upload_request("Gate A", Some(ACCOUNT), &[1])).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["code"], "detector_unavailable");
}

// =============================================================================
// Guards and cameras
// =============================================================================

#[tokio::test]
async fn test_guards_are_isolated_per_account() {
    let app = app();
    let guard = add_guard(&app.router, ACCOUNT, "Ravi", "9876543210", "Gate A").await;
    let id = guard["id"].as_str().unwrap().to_string();
    assert_eq!(guard["status"], "Active");

    let response = send(&app.router, get(&format!("/api/guards?user_email={ACCOUNT}"))).await;
    let mine = json_body(response).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let response = send(&app.router, get(&format!("/api/guards?user_email={OTHER_ACCOUNT}"))).await;
    let theirs = json_body(response).await;
    assert_eq!(theirs, json!([]));

    let delete_as = |account: &str| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/guards/{id}"))
            .header("X-Account-Id", account)
            .body(Body::empty())
            .unwrap()
    };

    let response = send(&app.router, delete_as(OTHER_ACCOUNT)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["detail"], "Guard not found");

    let response = send(&app.router, delete_as(ACCOUNT)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["message"], "Guard deleted successfully");

    let response = send(&app.router, delete_as(ACCOUNT)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_listing_without_account_is_rejected() {
    let app = app();
    let response = send(&app.router, get("/api/guards")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "validation_failed");
}

#[tokio::test]
async fn test_header_account_must_match_body() {
    let app = app();
    let mut request = post_json(
        "/api/guards",
        json!({"user_email": ACCOUNT, "name": "Ravi", "mobile": "9876543210", "gate": "Gate A"}),
    );
    request
        .headers_mut()
        .insert("X-Account-Id", OTHER_ACCOUNT.parse().unwrap());
    let response = send(&app.router, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_camera_upsert_replaces() {
    let app = app();
    add_camera(&app.router, ACCOUNT, "Gate A", "rtsp://10.0.0.4/stream1").await;
    add_camera(&app.router, ACCOUNT, "Gate A", "rtsp://10.0.0.5/stream2").await;
    add_camera(&app.router, OTHER_ACCOUNT, "Gate A", "0").await;

    let response = send(&app.router, get(&format!("/api/cameras?user_email={ACCOUNT}"))).await;
    let cameras = json_body(response).await;
    let cameras = cameras.as_array().unwrap();
    assert_eq!(cameras.len(), 1);
    assert_eq!(cameras[0]["rtsp_url"], "rtsp://10.0.0.5/stream2");
    assert_eq!(cameras[0]["status"], "Offline");
}

#[tokio::test]
async fn test_camera_rejects_unsupported_address() {
    let app = app();
    let response = send(
        &app.router,
        post_json(
            "/api/cameras",
            json!({"user_email": ACCOUNT, "gate": "Gate A", "rtsp_url": "ftp://10.0.0.4/cam"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Live feed
// =============================================================================

#[tokio::test]
async fn test_feed_without_camera_is_not_found() {
    let app = app();
    let response = send(&app.router, feed(ACCOUNT)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["detail"], "Camera not configured");
}

#[tokio::test]
async fn test_feed_unreachable_camera_is_unavailable() {
    let app = app();
    add_camera(&app.router, ACCOUNT, "Gate A", "rtsp://offline.local/stream").await;
    let response = send(&app.router, feed(ACCOUNT)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["detail"], "Camera stream unavailable");
    assert_eq!(app.handles.open_handles(), 0);
}

#[tokio::test]
async fn test_feed_rejects_unknown_mode() {
    let app = app();
    add_camera(&app.router, ACCOUNT, "Gate A", "0").await;
    let response = send(
        &app.router,
        get(&format!("/api/video-feed/Gate%20A?user_email={ACCOUNT}&mode=xray")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_feed_streams_parts_and_releases_camera_on_disconnect() {
    let app = app();
    add_camera(&app.router, ACCOUNT, "Gate A", "0").await;

    let response = send(
        &app.router,
        get(&format!("/api/video-feed/Gate%20A?user_email={ACCOUNT}&mode=thermal")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );
    assert_eq!(response.headers()["x-visualization"], "simulated-thermal");
    assert_eq!(app.handles.open_handles(), 1);

    let mut body = response.into_body();
    for _ in 0..3 {
        let frame = body.frame().await.unwrap().unwrap();
        let part = frame.into_data().unwrap();
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: "));
        assert!(part.ends_with(b"\r\n"));
    }

    // Client goes away.
    drop(body);
    assert_eq!(app.handles.open_handles(), 0);
}

#[tokio::test]
async fn test_server_shutdown_ends_open_feeds() {
    let app = app();
    add_camera(&app.router, ACCOUNT, "Gate A", "0").await;

    let response = send(&app.router, feed(ACCOUNT)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();
    assert!(body.frame().await.unwrap().unwrap().is_data());

    app.shutdown.send(true).unwrap();
    let end = tokio::time::timeout(Duration::from_secs(5), body.frame()).await.unwrap();
    assert!(end.is_none());
    drop(body);
    assert_eq!(app.handles.open_handles(), 0);
}

#[tokio::test]
async fn test_live_alert_cooldown_holds_across_reconnects() {
    let (sent, mut texts) = mpsc::unbounded_channel();
    let dispatcher =
        AlertDispatcher::new(Arc::new(RecordingGateway { sent }), Duration::from_secs(1));
    let config = ApiConfig {
        live_alerts_enabled: true,
        live_alert_cooldown: Duration::from_secs(300),
        ..ApiConfig::default()
    };
    let policy = AlertPolicy {
        default_threshold: 1,
        ..AlertPolicy::default()
    };
    let app = app_from(config, policy, dispatcher, true);
    add_camera(&app.router, ACCOUNT, "Gate A", "0").await;
    add_guard(&app.router, ACCOUNT, "Ravi", "9876543210", "Gate A").await;
    add_guard(&app.router, OTHER_ACCOUNT, "Meena", "9123456780", "Gate A").await;

    for _ in 0..5 {
        let response = send(&app.router, feed(ACCOUNT)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let mut body = response.into_body();
        for _ in 0..3 {
            body.frame().await.unwrap().unwrap();
        }
        drop(body);
        assert_eq!(app.handles.open_handles(), 0);
    }

    let (to, message) = tokio::time::timeout(Duration::from_secs(5), texts.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(to, "9876543210");
    assert!(message.contains("Gate A"));

    // Every later viewer of the gate was inside the cooldown.
    assert!(tokio::time::timeout(Duration::from_millis(200), texts.recv()).await.is_err());

    // Another account's gate of the same name has its own cooldown.
    add_camera(&app.router, OTHER_ACCOUNT, "Gate A", "1").await;
    let response = send(&app.router, feed(OTHER_ACCOUNT)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();
    body.frame().await.unwrap().unwrap();
    drop(body);

    let (to, _) = tokio::time::timeout(Duration::from_secs(5), texts.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(to, "9123456780");
}

// =============================================================================
// Accounts and health checks
// =============================================================================

#[tokio::test]
async fn test_signup_login_and_reset() {
    let app = app();
    let signup = json!({
        "name": "Asha",
        "email": "Asha@GateHouse.in",
        "mobile": "+91 98765 43210",
        "password": "hunter22",
    });

    let response = send(&app.router, post_json("/api/signup", signup.clone())).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(&app.router, post_json("/api/signup", signup)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["detail"], "Email already registered!");

    let login = |password: &str| {
        post_json(
            "/api/login",
            json!({"email": "asha@gatehouse.in", "password": password}),
        )
    };

    let response = send(&app.router, login("hunter22")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["name"], "Asha");

    let response = send(&app.router, login("wrong-pass")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["detail"], "Invalid Email or Password!");

    let response = send(
        &app.router,
        post_json(
            "/api/reset-password",
            json!({"email": "asha@gatehouse.in", "new_password": "correct-horse"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(send(&app.router, login("hunter22")).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(send(&app.router, login("correct-horse")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_and_readiness() {
    let app = app();
    let response = send(&app.router, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(json_body(response).await["status"], "healthy");

    let body = json_body(send(&app.router, get("/ready")).await).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["store"]["backend"], "memory");
    assert_eq!(body["checks"]["detector"]["backend"], "pixel");
    assert_eq!(body["checks"]["sms"]["backend"], "logged_only");
}
