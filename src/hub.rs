//! Locating the pretrained model — HuggingFace Hub download or a local copy.
//!
//! A model repository holds a `config.json` manifest naming the ONNX graph and
//! the voices NPZ file.  Hub downloads are cached in the HuggingFace cache
//! directory (`~/.cache/huggingface/hub` or `$HF_HOME`), so only the first
//! worker on a machine pays for the transfer.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use hf_hub::api::sync::Api;
use serde::Deserialize;
use tracing::info;

use crate::{
    config::ModelConfig,
    model::onnx::{ModelFiles, OnnxSpeechModel},
};

const MANIFEST: &str = "config.json";

/// Deserialised `config.json` of a model repository.
#[derive(Debug, Deserialize)]
pub struct ModelManifest {
    /// `"ONNX1"` or `"ONNX2"`.
    #[serde(rename = "type")]
    pub model_type: String,
    /// Graph filename inside the repo.
    pub model_file: String,
    /// Voices NPZ filename inside the repo.
    pub voices: String,
    #[serde(default)]
    pub speed_priors: HashMap<String, f32>,
    /// Friendly name → NPZ key.
    #[serde(default)]
    pub voice_aliases: HashMap<String, String>,
}

impl ModelManifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let manifest: Self = serde_json::from_slice(bytes).context("Failed to parse config.json")?;
        if !matches!(manifest.model_type.as_str(), "ONNX1" | "ONNX2") {
            bail!("Unsupported model type '{}', expected ONNX1 or ONNX2", manifest.model_type);
        }
        Ok(manifest)
    }

    fn into_files(self, model_path: PathBuf, voices_path: PathBuf) -> ModelFiles {
        ModelFiles {
            model_path,
            voices_path,
            speed_priors: self.speed_priors,
            voice_aliases: self.voice_aliases,
        }
    }
}

/// `"kitten-tts-mini-0.8"` → `"KittenML/kitten-tts-mini-0.8"`.
pub fn qualify_repo_id(repo_id: &str) -> String {
    if repo_id.contains('/') {
        repo_id.to_string()
    } else {
        format!("KittenML/{}", repo_id)
    }
}

/// Download (or reuse from cache) every file the model needs.
pub fn fetch_from_hub(repo_id: &str) -> Result<ModelFiles> {
    let repo_id = qualify_repo_id(repo_id);
    let api = Api::new().context("Failed to initialise HuggingFace Hub client")?;
    let repo = api.model(repo_id.clone());
    let get = |name: &str| {
        info!(repo = %repo_id, file = name, "fetching model file");
        repo.get(name)
            .with_context(|| format!("Failed to download '{}' from '{}'", name, repo_id))
    };

    let manifest_path = get(MANIFEST)?;
    let bytes = std::fs::read(&manifest_path)
        .with_context(|| format!("Cannot read manifest: {}", manifest_path.display()))?;
    let manifest = ModelManifest::from_slice(&bytes)?;

    let model_path = get(&manifest.model_file)?;
    let voices_path = get(&manifest.voices)?;
    Ok(manifest.into_files(model_path, voices_path))
}

/// Use a model directory laid out like the Hub repository.
pub fn read_local(dir: &Path) -> Result<ModelFiles> {
    let manifest_path = dir.join(MANIFEST);
    let bytes = std::fs::read(&manifest_path)
        .with_context(|| format!("Cannot read manifest: {}", manifest_path.display()))?;
    let manifest = ModelManifest::from_slice(&bytes)?;

    let model_path = dir.join(&manifest.model_file);
    let voices_path = dir.join(&manifest.voices);
    for path in [&model_path, &voices_path] {
        if !path.is_file() {
            bail!("Model file listed in {} is missing: {}", manifest_path.display(), path.display());
        }
    }
    Ok(manifest.into_files(model_path, voices_path))
}

/// Model Host initialisation: locate the files and build the session.
///
/// Called once per process, before the listener is bound.  Any error here is
/// fatal to the worker.
pub fn load_model(config: &ModelConfig) -> Result<OnnxSpeechModel> {
    let files = match &config.local_dir {
        Some(dir) => read_local(dir)?,
        None => fetch_from_hub(&config.repo_id)?,
    };
    OnnxSpeechModel::load(files, config.device, &config.voice, config.speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST_JSON: &str = r#"{
        "type": "ONNX1",
        "model_file": "model.onnx",
        "voices": "voices.npz",
        "voice_aliases": {"Jasper": "expr-voice-2-m"}
    }"#;

    #[test]
    fn test_manifest_parses() {
        let m = ModelManifest::from_slice(MANIFEST_JSON.as_bytes()).unwrap();
        assert_eq!(m.model_file, "model.onnx");
        assert!(m.speed_priors.is_empty());
        assert_eq!(m.voice_aliases["Jasper"], "expr-voice-2-m");
    }

    #[test]
    fn test_manifest_rejects_unknown_type() {
        let json = r#"{"type": "PT", "model_file": "m", "voices": "v"}"#;
        assert!(ModelManifest::from_slice(json.as_bytes()).is_err());
    }

    #[test]
    fn test_qualify_repo_id() {
        assert_eq!(qualify_repo_id("kitten-tts-mini-0.8"), "KittenML/kitten-tts-mini-0.8");
        assert_eq!(qualify_repo_id("org/model"), "org/model");
    }

    #[test]
    fn test_read_local_requires_listed_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST), MANIFEST_JSON).unwrap();
        assert!(read_local(dir.path()).is_err());

        std::fs::write(dir.path().join("model.onnx"), b"graph").unwrap();
        std::fs::write(dir.path().join("voices.npz"), b"voices").unwrap();
        let files = read_local(dir.path()).unwrap();
        assert_eq!(files.model_path, dir.path().join("model.onnx"));
        assert_eq!(files.voice_aliases.len(), 1);
    }
}
