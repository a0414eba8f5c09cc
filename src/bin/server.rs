//! tts-server — speech generation over HTTP.
//!
//! Usage:
//!   tts-server --config service.json
//!   tts-server --storage-root /s3-mount --model KittenML/kitten-tts-mini-0.8 --port 8000
//!
//! Credentials come from `--auth-key` / `--auth-secret` or the
//! `TTS_AUTH_KEY` / `TTS_AUTH_SECRET` environment variables.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tts_generator::{
    hub, logging, model::phonemize, server, ServiceConfig, SpeechService, Storage,
};

/// Text-to-speech HTTP server writing WAV files to a mounted object store
#[derive(Debug, Parser)]
#[command(name = "tts-server", author, version, about)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Directory where the object store is mounted
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// HuggingFace repository ID of the model
    #[arg(long)]
    model: Option<String>,

    /// Load the model from a local directory instead of the Hub
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Default voice name
    #[arg(long)]
    voice: Option<String>,

    /// espeak-ng data directory (defaults to the library's built-in path)
    #[arg(long, env = "ESPEAK_DATA_PATH")]
    espeak_data: Option<PathBuf>,

    /// Caller key expected in the key header
    #[arg(long, env = "TTS_AUTH_KEY", hide_env_values = true)]
    auth_key: Option<String>,

    /// Caller secret expected in the secret header
    #[arg(long, env = "TTS_AUTH_SECRET", hide_env_values = true)]
    auth_secret: Option<String>,

    /// Log level (overridden by RUST_LOG)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn into_config(self) -> Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::from_file(path)?,
            None => ServiceConfig::default(),
        };

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(root) = self.storage_root {
            config.storage.root = root;
        }
        if let Some(model) = self.model {
            config.model.repo_id = model;
        }
        if let Some(dir) = self.model_dir {
            config.model.local_dir = Some(dir);
        }
        if let Some(voice) = self.voice {
            config.model.voice = voice;
        }
        if let Some(dir) = self.espeak_data {
            config.model.espeak_data = Some(dir);
        }
        if let Some(key) = self.auth_key {
            config.auth.key = Some(key);
        }
        if let Some(secret) = self.auth_secret {
            config.auth.secret = Some(secret);
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if self.json_logs {
            config.logging.json = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;
    logging::init_logging(&config.logging);

    let model_source = match &config.model.local_dir {
        Some(dir) => dir.display().to_string(),
        None => config.model.repo_id.clone(),
    };
    info!(
        version = env!("CARGO_PKG_VERSION"),
        storage = %config.storage.root.display(),
        model = %model_source,
        "starting tts-server"
    );

    if let Some(dir) = &config.model.espeak_data {
        phonemize::set_data_path(dir);
    }
    phonemize::ensure_ready().context("Phonemizer unavailable")?;

    // Model Host initialisation happens once, before serving.  Download and
    // session construction block, so keep them off the async workers.
    let model_config = config.model.clone();
    let model = tokio::task::spawn_blocking(move || hub::load_model(&model_config))
        .await
        .context("Model loading task failed")?
        .context("Failed to load speech model")?;

    info!(
        voice = model.default_voice(),
        available = %model.voices().join(", "),
        "model ready"
    );

    let storage = Storage::new(&config.storage.root, &config.storage.output_prefix);
    let service = SpeechService::new(Arc::new(model), storage);

    server::serve(&config, service).await?;
    info!("server stopped");
    Ok(())
}
