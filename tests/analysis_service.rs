//! Analysis client and capture session against an in-process mock service

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use posture_capture::ai_client::{AiClient, AnalysisError, AnalysisService};
use posture_capture::capture_session::CaptureSession;
use posture_capture::media_capture::SyntheticCamera;
use posture_capture::models::{AnalysisMode, InputBlob};
use posture_capture::Error;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the mock saw in one multipart request
#[derive(Debug, Clone, Default)]
struct Received {
    file_name: Option<String>,
    content_type: Option<String>,
    head: Vec<u8>,
    size: usize,
    posture_type: Option<String>,
}

type Log = Arc<Mutex<Vec<Received>>>;

async fn spawn_mock(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn analyze_frame(State(log): State<Log>, mut multipart: Multipart) -> Response {
    let mut received = Received::default();

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                received.file_name = field.file_name().map(str::to_string);
                received.content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.unwrap();
                received.size = bytes.len();
                received.head = bytes.iter().take(2).copied().collect();
            }
            "posture_type" => received.posture_type = Some(field.text().await.unwrap()),
            _ => {}
        }
    }

    log.lock().unwrap().push(received.clone());

    match received.posture_type.as_deref() {
        Some(mode @ ("squat" | "sitting")) => Json(json!({
            "has_bad_posture": true,
            "issues": ["knee valgus"],
            "annotated_image": "data:image/jpeg;base64,/9j/4AAQ",
            "posture_type": mode,
        }))
        .into_response(),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Invalid posture type. Use 'squat' or 'sitting'"})),
        )
            .into_response(),
    }
}

async fn mock_service() -> (String, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route(
            "/",
            get(|| async { Json(json!({"message": "Bad Posture Detection API is running"})) }),
        )
        .route("/analyze-frame", post(analyze_frame))
        .with_state(log.clone());
    (spawn_mock(router).await, log)
}

fn jpeg(size: usize) -> InputBlob {
    InputBlob::new("pose.jpg", "image/jpeg", vec![0xAB; size])
}

#[tokio::test]
async fn test_analyze_sends_multipart() {
    let (url, log) = mock_service().await;
    let client = AiClient::new(url).unwrap();

    let result = client
        .analyze(&jpeg(2048), AnalysisMode::Sitting)
        .await
        .unwrap();
    assert!(result.has_bad_posture);
    assert_eq!(result.issues, vec!["knee valgus".to_string()]);
    assert_eq!(result.posture_type, Some(AnalysisMode::Sitting));
    assert!(result.annotated_image_bytes().unwrap().is_some());

    let received = log.lock().unwrap()[0].clone();
    assert_eq!(received.file_name.as_deref(), Some("pose.jpg"));
    assert_eq!(received.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(received.size, 2048);
    assert_eq!(received.posture_type.as_deref(), Some("sitting"));
}

#[tokio::test]
async fn test_server_message_field() {
    let router = Router::new().route(
        "/analyze-frame",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": "Model crashed"})),
            )
        }),
    );
    let client = AiClient::new(spawn_mock(router).await).unwrap();

    let err = client
        .analyze(&jpeg(10), AnalysisMode::Squat)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AnalysisError::ServerRejected {
            status: 500,
            message: "Model crashed".to_string()
        }
    );
    assert_eq!(Error::from(err).user_message(), "Analysis failed: Model crashed");
}

#[tokio::test]
async fn test_server_error_field() {
    let router = Router::new().route(
        "/analyze-frame",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "No pose detected. Ensure a person is visible."})),
            )
        }),
    );
    let client = AiClient::new(spawn_mock(router).await).unwrap();

    let err = client
        .analyze(&jpeg(10), AnalysisMode::Squat)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::ServerRejected { status: 400, ref message }
            if message == "No pose detected. Ensure a person is visible."
    ));
}

#[tokio::test]
async fn test_server_error_without_body() {
    let router = Router::new().route(
        "/analyze-frame",
        post(|| async { (StatusCode::BAD_GATEWAY, "<html>bad gateway</html>") }),
    );
    let client = AiClient::new(spawn_mock(router).await).unwrap();

    let err = client
        .analyze(&jpeg(10), AnalysisMode::Squat)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Server error (502)");
}

#[tokio::test]
async fn test_empty_success_body() {
    let router = Router::new().route("/analyze-frame", post(|| async { "" }));
    let client = AiClient::new(spawn_mock(router).await).unwrap();

    let err = client
        .analyze(&jpeg(10), AnalysisMode::Squat)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AnalysisError::ClientSideFault("No analysis data received".to_string())
    );
}

#[tokio::test]
async fn test_no_response() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = AiClient::new(url).unwrap();
    let err = client
        .analyze(&jpeg(10), AnalysisMode::Squat)
        .await
        .unwrap_err();
    assert_eq!(err, AnalysisError::NoResponse);
    assert_eq!(
        Error::from(err).user_message(),
        "Analysis failed: No response from server. Please check if the API is running."
    );
    assert!(!client.health_check().await);
}

#[tokio::test]
async fn test_timeout_is_no_response() {
    let router = Router::new().route(
        "/analyze-frame",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"has_bad_posture": false, "issues": []}))
        }),
    );
    let url = spawn_mock(router).await;
    let client = AiClient::with_timeout(url, Duration::from_millis(200)).unwrap();

    let err = client
        .analyze(&jpeg(10), AnalysisMode::Squat)
        .await
        .unwrap_err();
    assert_eq!(err, AnalysisError::NoResponse);
}

#[tokio::test]
async fn test_health_check() {
    let (url, _) = mock_service().await;
    let client = AiClient::new(url).unwrap();
    assert!(client.health_check().await);
}

#[tokio::test]
async fn test_session_uploaded_file() {
    let (url, log) = mock_service().await;
    let service = Arc::new(AiClient::new(url).unwrap());
    let session = CaptureSession::new(Arc::new(SyntheticCamera::default()), service);

    session.change_mode(AnalysisMode::Sitting).await;
    session.select_file(Some(jpeg(2048))).await.unwrap();
    let result = session.submit_analysis().await.unwrap().unwrap();
    assert_eq!(result.issues, vec!["knee valgus".to_string()]);

    let snapshot = session.snapshot().await;
    assert!(snapshot.result.is_some());
    assert!(snapshot.error.is_none());
    assert_eq!(log.lock().unwrap()[0].posture_type.as_deref(), Some("sitting"));

    session.teardown().await;
    assert_eq!(session.previews().live_count(), 0);
}

#[tokio::test]
async fn test_session_webcam_frame() {
    let (url, log) = mock_service().await;
    let camera = Arc::new(SyntheticCamera::default());
    let service = Arc::new(AiClient::new(url).unwrap());
    let session = CaptureSession::new(camera.clone(), service);

    session.start_camera().await.unwrap();
    session.capture_and_analyze().await.unwrap().unwrap();
    assert!(session.stop_camera().await);

    let received = log.lock().unwrap()[0].clone();
    assert_eq!(received.file_name.as_deref(), Some("webcam_frame.jpg"));
    assert_eq!(received.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(received.head, vec![0xFF, 0xD8]);
    assert_eq!(received.posture_type.as_deref(), Some("squat"));
    assert_eq!(camera.live_count(), 0);
}

#[tokio::test]
async fn test_session_with_file_on_disk() {
    let (url, log) = mock_service().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("side_view.png");
    tokio::fs::write(&path, vec![0x89, 0x50, 0x4E, 0x47, 1, 2, 3]).await.unwrap();

    let blob = InputBlob::from_path(&path).await.unwrap();
    assert_eq!(blob.mime_type, "image/png");

    let session = CaptureSession::new(
        Arc::new(SyntheticCamera::default()),
        Arc::new(AiClient::new(url).unwrap()),
    );
    session.select_file(Some(blob)).await.unwrap();
    session.submit_analysis().await.unwrap();

    let received = log.lock().unwrap()[0].clone();
    assert_eq!(received.file_name.as_deref(), Some("side_view.png"));
    assert_eq!(received.content_type.as_deref(), Some("image/png"));
}
