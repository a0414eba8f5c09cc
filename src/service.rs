//! Request Handler — one speech request, end to end.
//!
//! validate → resolve reference → generate → encode WAV → write → key.
//! Everything here is synchronous; the HTTP layer runs it on a blocking
//! thread.

use std::{path::PathBuf, time::Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    audio::encode_wav,
    error::SynthesisError,
    model::{ModelHandle, PromptKind},
    storage::Storage,
};

/// Body of `POST /generate_speech`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    /// Storage key of a reference clip to clone the voice from.
    #[serde(rename = "voice_S3_key", default)]
    pub voice_s3_key: Option<String>,
    /// Accepted for compatibility; generation does not use it.
    #[serde(default)]
    pub voice_description: Option<String>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), voice_s3_key: None, voice_description: None }
    }

    pub fn with_voice(mut self, key: impl Into<String>) -> Self {
        self.voice_s3_key = Some(key.into());
        self
    }

    /// The reference key, treating an empty string like an absent one.
    fn reference_key(&self) -> Option<&str> {
        self.voice_s3_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Success body of `POST /generate_speech`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisResponse {
    pub s3_key: String,
}

/// Owns the model handle and the storage mount; cheap to clone.
#[derive(Clone)]
pub struct SpeechService {
    model: ModelHandle,
    storage: Storage,
}

impl SpeechService {
    pub fn new(model: ModelHandle, storage: Storage) -> Self {
        Self { model, storage }
    }

    pub fn sample_rate(&self) -> u32 {
        self.model.sample_rate()
    }

    /// Synthesise `request.text` and store it as a new WAV object.
    ///
    /// Either the whole file is written and its key returned, or nothing is
    /// written and an error is returned.
    pub fn generate_speech(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesisResponse, SynthesisError> {
        let started = Instant::now();

        if request.text.trim().is_empty() {
            return Err(SynthesisError::invalid_input("text must not be empty"));
        }
        if let Some(description) = &request.voice_description {
            debug!(%description, "voice_description is not used by generation");
        }

        // Missing or unusable references fail before the model is touched.
        let prompt = request
            .reference_key()
            .map(|key| self.reference(key))
            .transpose()?;

        info!(
            chars = request.text.chars().count(),
            cloning = prompt.is_some(),
            reference = request.reference_key().unwrap_or(""),
            "generating speech"
        );

        let samples = self
            .model
            .generate(&request.text, prompt.as_deref())
            .map_err(SynthesisError::Model)?;
        let wav = encode_wav(&samples, self.model.sample_rate())?;

        let s3_key = self.storage.new_output_key();
        self.storage.put(&s3_key, &wav)?;

        info!(
            key = %s3_key,
            bytes = wav.len(),
            seconds = samples.len() as f32 / self.model.sample_rate().max(1) as f32,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "saved audio"
        );
        Ok(SynthesisResponse { s3_key })
    }

    fn reference(&self, key: &str) -> Result<PathBuf, SynthesisError> {
        let path = self.storage.resolve_existing(key)?;
        match PromptKind::of(&path) {
            kind if self.model.supports_prompt(kind) => Ok(path),
            PromptKind::Audio => Err(SynthesisError::UnsupportedReference {
                key: key.to_string(),
                reason: "the model cannot clone from audio clips, use a .npy style matrix",
            }),
            PromptKind::Style => Err(SynthesisError::UnsupportedReference {
                key: key.to_string(),
                reason: "the model cannot clone from style matrices",
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::model::SpeechModel;

    /// Records the prompt it was given and returns a short ramp.
    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<Option<PathBuf>>>,
        style_only: bool,
    }

    impl RecordingModel {
        fn style_only() -> Self {
            Self { style_only: true, ..Self::default() }
        }
    }

    impl SpeechModel for RecordingModel {
        fn sample_rate(&self) -> u32 {
            16_000
        }

        fn generate(&self, text: &str, prompt: Option<&Path>) -> anyhow::Result<Vec<f32>> {
            self.prompts.lock().unwrap().push(prompt.map(Path::to_path_buf));
            Ok((0..text.len() * 10).map(|i| (i % 100) as f32 / 100.0).collect())
        }

        fn supports_prompt(&self, kind: PromptKind) -> bool {
            !self.style_only || kind == PromptKind::Style
        }
    }

    fn service_with(
        model: RecordingModel,
    ) -> (tempfile::TempDir, Arc<RecordingModel>, SpeechService) {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(model);
        let svc = SpeechService::new(model.clone(), Storage::new(dir.path(), "tts"));
        (dir, model, svc)
    }

    fn service() -> (tempfile::TempDir, Arc<RecordingModel>, SpeechService) {
        service_with(RecordingModel::default())
    }

    fn put_reference(dir: &Path, key: &str) -> PathBuf {
        let path = dir.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"clip").unwrap();
        path
    }

    #[test]
    fn test_text_only_writes_wav() {
        let (dir, model, svc) = service();
        let resp = svc.generate_speech(&SynthesisRequest::new("Hello world")).unwrap();
        assert!(resp.s3_key.starts_with("tts/"));

        let reader = hound::WavReader::open(dir.path().join(&resp.s3_key)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.len(), 110);
        assert_eq!(*model.prompts.lock().unwrap(), vec![None]);
    }

    #[test]
    fn test_reference_is_passed_as_path() {
        let (dir, model, svc) = service();
        let voices = dir.path().join("samples/voices");
        std::fs::create_dir_all(&voices).unwrap();
        std::fs::write(voices.join("mark.wav"), b"clip").unwrap();

        let req = SynthesisRequest::new("Hello").with_voice("samples/voices/mark.wav");
        let resp = svc.generate_speech(&req).unwrap();
        assert_ne!(resp.s3_key, "samples/voices/mark.wav");
        assert_eq!(*model.prompts.lock().unwrap(), vec![Some(voices.join("mark.wav"))]);
    }

    #[test]
    fn test_audio_reference_refused_by_style_only_model() {
        let (dir, model, svc) = service_with(RecordingModel::style_only());
        put_reference(dir.path(), "samples/voices/mark.wav");

        let req = SynthesisRequest::new("Hello").with_voice("samples/voices/mark.wav");
        let err = svc.generate_speech(&req).unwrap_err();
        assert!(matches!(err, SynthesisError::UnsupportedReference { .. }));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(model.prompts.lock().unwrap().is_empty());
        assert!(!dir.path().join("tts").exists());
    }

    #[test]
    fn test_style_reference_accepted_by_style_only_model() {
        let (dir, model, svc) = service_with(RecordingModel::style_only());
        let path = put_reference(dir.path(), "samples/voices/mark.npy");

        let req = SynthesisRequest::new("Hello").with_voice("samples/voices/mark.npy");
        svc.generate_speech(&req).unwrap();
        assert_eq!(*model.prompts.lock().unwrap(), vec![Some(path)]);
    }

    #[test]
    fn test_empty_reference_means_default_voice() {
        let (_dir, model, svc) = service();
        svc.generate_speech(&SynthesisRequest::new("Hello").with_voice("")).unwrap();
        assert_eq!(*model.prompts.lock().unwrap(), vec![None]);
    }

    #[test]
    fn test_missing_reference_skips_model() {
        let (dir, model, svc) = service();
        let req = SynthesisRequest::new("Hello").with_voice("samples/voices/missing.wav");
        let err = svc.generate_speech(&req).unwrap_err();
        assert!(matches!(err, SynthesisError::VoiceNotFound { .. }));
        assert!(model.prompts.lock().unwrap().is_empty());
        assert!(!dir.path().join("tts").exists());
    }

    #[test]
    fn test_blank_text_rejected() {
        let (_dir, model, svc) = service();
        let err = svc.generate_speech(&SynthesisRequest::new("  \n")).unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidInput(_)));
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_request_wire_names() {
        let req: SynthesisRequest = serde_json::from_str(
            r#"{"text": "Hi", "voice_S3_key": null, "voice_description": "calm"}"#,
        )
        .unwrap();
        assert_eq!(req.text, "Hi");
        assert!(req.voice_s3_key.is_none());
        assert_eq!(req.voice_description.as_deref(), Some("calm"));

        let req: SynthesisRequest = serde_json::from_str(r#"{"text": "Hi"}"#).unwrap();
        assert!(req.voice_s3_key.is_none());
    }
}
