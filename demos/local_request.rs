//! Local smoke run — loads the model and sends one authenticated request
//! through the HTTP router in-process, exactly as a remote caller would.
//!
//! Usage:
//!   cargo run --example local_request --features server
//!   cargo run --example local_request --features server -- \
//!       --text "Hello from Rust!" --voice-key samples/voices/mark.npy --storage ./mount
//!
//! Requirements:
//!   - libespeak-ng installed (see Cargo.toml)
//!   - Internet access for the first run (the model is cached afterwards)

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use clap::Parser;
use serde_json::{json, Value};
use tower::ServiceExt;

use tts_generator::{
    config::{AuthConfig, ModelConfig},
    hub,
    model::phonemize,
    server::{routes, state::AppState},
    SpeechService, Storage,
};

#[derive(Debug, Parser)]
struct Args {
    /// Text to speak
    #[arg(long, default_value = "This high quality TTS model works without a GPU.")]
    text: String,

    /// Storage key of a reference voice under the storage root
    #[arg(long)]
    voice_key: Option<String>,

    /// Directory standing in for the object store mount
    #[arg(long, default_value = "./s3-mount")]
    storage: PathBuf,

    /// HuggingFace repository ID of the model
    #[arg(long, default_value = "KittenML/kitten-tts-mini-0.8")]
    model: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    phonemize::ensure_ready().context("Phonemizer unavailable")?;

    println!("Loading model '{}'...", args.model);
    let model_config = ModelConfig { repo_id: args.model.clone(), ..ModelConfig::default() };
    let model = tokio::task::spawn_blocking(move || hub::load_model(&model_config)).await??;
    println!("Voices: {}", model.voices().join(", "));

    // Same header names the deployed service checks.
    let auth = AuthConfig {
        key: Some("local-key".into()),
        secret: Some("local-secret".into()),
        ..AuthConfig::default()
    };
    let service = SpeechService::new(Arc::new(model), Storage::new(&args.storage, "tts"));
    let app = routes::create_router(AppState::new(service, auth.clone()));

    let body = json!({ "text": args.text, "voice_S3_key": args.voice_key });
    let request = Request::builder()
        .method("POST")
        .uri("/generate_speech")
        .header("Content-Type", "application/json")
        .header(auth.key_header.as_str(), "local-key")
        .header(auth.secret_header.as_str(), "local-secret")
        .body(Body::from(body.to_string()))?;

    let response = app.oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let reply: Value = serde_json::from_slice(&bytes).context("Response is not JSON")?;

    if status != StatusCode::OK {
        bail!("request failed ({}): {}", status, reply["error"]);
    }
    let key = reply["s3_key"].as_str().context("Response has no s3_key")?;
    println!("Saved → {}", args.storage.join(key).display());
    Ok(())
}
