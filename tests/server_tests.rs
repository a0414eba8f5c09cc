use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt; // for oneshot

use tts_generator::{
    config::AuthConfig,
    model::PromptKind,
    server::{routes, state::AppState},
    SpeechModel, SpeechService, Storage,
};

const SAMPLE_RATE: u32 = 22_050;

/// Deterministic stand-in for the real model: a quarter second of tone,
/// or an error when the text says so.
#[derive(Default)]
struct ToneModel {
    calls: AtomicUsize,
    style_only: bool,
}

impl ToneModel {
    /// Like a model that clones only from `.npy` style matrices.
    fn style_only() -> Self {
        Self { style_only: true, ..Self::default() }
    }
}

impl SpeechModel for ToneModel {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn generate(&self, text: &str, _prompt: Option<&Path>) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("explode") {
            anyhow::bail!("CUDA out of memory");
        }
        let n = SAMPLE_RATE as usize / 4;
        Ok((0..n).map(|i| (i as f32 * 0.05).sin() * 0.5).collect())
    }

    fn supports_prompt(&self, kind: PromptKind) -> bool {
        !self.style_only || kind == PromptKind::Style
    }
}

struct Harness {
    root: tempfile::TempDir,
    model: Arc<ToneModel>,
    app: Router,
}

fn harness(auth: AuthConfig) -> Harness {
    harness_with(ToneModel::default(), auth)
}

fn harness_with(model: ToneModel, auth: AuthConfig) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let model = Arc::new(model);
    let service = SpeechService::new(model.clone(), Storage::new(root.path(), "tts"));
    let app = routes::create_router(AppState::new(service, auth));
    Harness { root, model, app }
}

fn post(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate_speech")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response: Response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn output_count(root: &Path) -> usize {
    std::fs::read_dir(root.join("tts")).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_health() {
    let h = harness(AuthConfig::default());
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sample_rate"], SAMPLE_RATE);
}

#[tokio::test]
async fn test_text_only_request_writes_wav() {
    let h = harness(AuthConfig::default());
    let (status, body) =
        send(&h.app, post(json!({"text": "Hello world", "voice_S3_key": null}))).await;
    assert_eq!(status, StatusCode::OK);

    let key = body["s3_key"].as_str().unwrap();
    assert!(key.starts_with("tts/") && key.ends_with(".wav"), "unexpected key {key}");

    let path = h.root.path().join(key);
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.len(), SAMPLE_RATE / 4);
}

#[tokio::test]
async fn test_repeated_requests_get_distinct_keys() {
    let h = harness(AuthConfig::default());
    let request = json!({"text": "Same text"});
    let (_, first) = send(&h.app, post(request.clone())).await;
    let (_, second) = send(&h.app, post(request)).await;
    assert_ne!(first["s3_key"], second["s3_key"]);
    assert_eq!(output_count(h.root.path()), 2);
}

#[tokio::test]
async fn test_reference_voice_request() {
    let h = harness(AuthConfig::default());
    let voices = h.root.path().join("samples/voices");
    std::fs::create_dir_all(&voices).unwrap();
    std::fs::write(voices.join("mark.wav"), b"reference clip").unwrap();

    let (status, body) = send(
        &h.app,
        post(json!({"text": "Clone me", "voice_S3_key": "samples/voices/mark.wav"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["s3_key"], "samples/voices/mark.wav");
}

#[tokio::test]
async fn test_missing_reference_is_not_found() {
    let h = harness(AuthConfig::default());
    let (status, body) = send(
        &h.app,
        post(json!({"text": "Hello", "voice_S3_key": "samples/voices/missing.wav"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("samples/voices/missing.wav"));
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(output_count(h.root.path()), 0);
}

#[tokio::test]
async fn test_escaping_reference_is_bad_request() {
    let h = harness(AuthConfig::default());
    let (status, _) =
        send(&h.app, post(json!({"text": "Hello", "voice_S3_key": "../secrets.wav"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_text_is_bad_request() {
    let h = harness(AuthConfig::default());
    let (status, _) = send(&h.app, post(json!({"text": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_text_field_is_rejected() {
    let h = harness(AuthConfig::default());
    let (status, body) = send(&h.app, post(json!({"voice_description": "warm"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("missing field `text`"));
}

#[tokio::test]
async fn test_unparseable_body_gets_json_error() {
    let h = harness(AuthConfig::default());
    let request = Request::builder()
        .method("POST")
        .uri("/generate_speech")
        .header("Content-Type", "application/json")
        .body(Body::from("{\"text\": "))
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_wrong_content_type_gets_json_error() {
    let h = harness(AuthConfig::default());
    let request = Request::builder()
        .method("POST")
        .uri("/generate_speech")
        .header("Content-Type", "text/plain")
        .body(Body::from(json!({"text": "Hello"}).to_string()))
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["error"].is_string());
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_audio_reference_refused_by_style_only_model() {
    let h = harness_with(ToneModel::style_only(), AuthConfig::default());
    let voices = h.root.path().join("samples/voices");
    std::fs::create_dir_all(&voices).unwrap();
    std::fs::write(voices.join("mark.wav"), b"RIFF").unwrap();

    let (status, body) =
        send(&h.app, post(json!({"text": "Hello", "voice_S3_key": "samples/voices/mark.wav"})))
            .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("samples/voices/mark.wav"));
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(output_count(h.root.path()), 0);
}

#[tokio::test]
async fn test_model_failure_is_server_error_without_output() {
    let h = harness(AuthConfig::default());
    let (status, body) = send(&h.app, post(json!({"text": "please explode"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("out of memory"));
    assert_eq!(output_count(h.root.path()), 0);
}

#[tokio::test]
async fn test_credentials_required_when_configured() {
    let auth = AuthConfig {
        key: Some("wk-test".into()),
        secret: Some("ws-test".into()),
        ..AuthConfig::default()
    };
    let h = harness(auth);

    let (status, _) = send(&h.app, post(json!({"text": "Hello"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut wrong = post(json!({"text": "Hello"}));
    wrong.headers_mut().insert("Modal-Key", "wk-test".parse().unwrap());
    wrong.headers_mut().insert("Modal-Secret", "ws-wrong".parse().unwrap());
    let (status, _) = send(&h.app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);

    let mut good = post(json!({"text": "Hello"}));
    good.headers_mut().insert("Modal-Key", "wk-test".parse().unwrap());
    good.headers_mut().insert("Modal-Secret", "ws-test".parse().unwrap());
    let (status, body) = send(&h.app, good).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["s3_key"].is_string());

    // Health stays open for the platform's probes.
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
}
