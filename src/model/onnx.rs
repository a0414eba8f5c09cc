//! ONNX Runtime speech model.
//!
//! The graph takes three positional inputs and returns a waveform:
//!
//! | Input       | Shape          | dtype   |
//! |-------------|----------------|---------|
//! | `input_ids` | `[1, seq_len]` | int64   |
//! | `style`     | `[1, style_d]` | float32 |
//! | `speed`     | `[1]`          | float32 |
//!
//! A voice is a style matrix whose rows are indexed by input length.  Voices
//! ship in an NPZ file next to the graph; a caller can also clone a voice by
//! passing a `.npy` style matrix as the reference prompt.

use std::{
    borrow::Cow,
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{bail, Context, Result};
use ort::{
    session::{builder::SessionBuilder, Session},
    value::Tensor,
};
use tracing::info;

use crate::{
    config::Device,
    model::{
        npz::{load_npy, load_npz, NpyArray},
        tokenize::ipa_to_ids,
        PromptKind,
    },
};

/// Audio sample rate produced by the graph.
pub const SAMPLE_RATE: u32 = 24_000;

/// Samples dropped from the end of every chunk (the graph emits a silent tail).
const TAIL_TRIM: usize = 5_000;

/// Maximum characters per chunk handed to the phonemizer.
#[cfg_attr(not(feature = "espeak"), allow(dead_code))]
const CHUNK_MAX_CHARS: usize = 400;

// ─────────────────────────────────────────────────────────────────────────────
// Sentence chunking
// ─────────────────────────────────────────────────────────────────────────────

/// Make sure a chunk ends in punctuation so the model closes the phrase.
fn ensure_punctuation(text: &str) -> String {
    let text = text.trim();
    match text.chars().last() {
        None => String::new(),
        Some(c) if ".!?,;:".contains(c) => text.to_string(),
        Some(_) => format!("{},", text),
    }
}

/// Split on sentence terminators, then greedily pack over-long sentences
/// word by word into pieces of at most `max_len` bytes.
#[cfg_attr(not(feature = "espeak"), allow(dead_code))]
fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    for sentence in text.split_terminator(['.', '!', '?']).map(str::trim) {
        if sentence.is_empty() {
            continue;
        }
        if sentence.len() <= max_len {
            chunks.push(ensure_punctuation(sentence));
            continue;
        }
        let mut piece = String::new();
        for word in sentence.split_whitespace() {
            if !piece.is_empty() && piece.len() + 1 + word.len() > max_len {
                chunks.push(ensure_punctuation(&piece));
                piece.clear();
            }
            if !piece.is_empty() {
                piece.push(' ');
            }
            piece.push_str(word);
        }
        if !piece.is_empty() {
            chunks.push(ensure_punctuation(&piece));
        }
    }
    chunks
}

// ─────────────────────────────────────────────────────────────────────────────
// Style matrices
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StyleMatrix {
    nrows: usize,
    ncols: usize,
    data: Vec<f32>,
}

impl StyleMatrix {
    fn from_npy(arr: NpyArray) -> Result<Self> {
        let nrows = arr.nrows();
        let ncols = arr.ncols().unwrap_or(0);
        if nrows == 0 || ncols == 0 || nrows.checked_mul(ncols) != Some(arr.data.len()) {
            bail!(
                "Style matrix is empty or malformed (shape {:?}, {} values)",
                arr.shape,
                arr.data.len()
            );
        }
        Ok(Self { nrows, ncols, data: arr.data })
    }

    /// Row for an input of `len` characters, clamped to the last row.
    #[cfg_attr(not(feature = "espeak"), allow(dead_code))]
    fn row(&self, len: usize) -> &[f32] {
        let i = len.min(self.nrows - 1);
        &self.data[i * self.ncols..(i + 1) * self.ncols]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Voices
// ─────────────────────────────────────────────────────────────────────────────

/// The shipped voices plus the default-voice settings.
#[derive(Debug)]
struct VoiceBank {
    voices: HashMap<String, StyleMatrix>,
    names: Vec<String>,
    speed_priors: HashMap<String, f32>,
    default_voice: String,
    speed: f32,
}

impl VoiceBank {
    /// `voice` becomes the default (aliases are honoured) and must exist.
    fn new(
        raw: HashMap<String, NpyArray>,
        speed_priors: HashMap<String, f32>,
        voice_aliases: &HashMap<String, String>,
        voice: &str,
        speed: f32,
    ) -> Result<Self> {
        let mut voices = HashMap::with_capacity(raw.len());
        for (name, arr) in raw {
            let matrix = StyleMatrix::from_npy(arr)
                .with_context(|| format!("Bad style matrix for voice '{}'", name))?;
            voices.insert(name, matrix);
        }
        let mut names: Vec<String> = voices.keys().cloned().collect();
        names.sort();

        let default_voice = voice_aliases
            .get(voice)
            .cloned()
            .unwrap_or_else(|| voice.to_string());
        if !voices.contains_key(&default_voice) {
            bail!("Unknown voice '{}'. Available: {:?}", voice, names);
        }

        Ok(Self { voices, names, speed_priors, default_voice, speed })
    }

    fn default_speed(&self) -> f32 {
        self.speed * self.speed_priors.get(&self.default_voice).copied().unwrap_or(1.0)
    }

    /// Style matrix and speed for one request.
    ///
    /// No prompt selects the default voice.  A `.npy` prompt is the style
    /// matrix to clone.  Audio prompts are refused: the graph has no input
    /// that could condition on a recording.
    #[cfg_attr(not(feature = "espeak"), allow(dead_code))]
    fn select(&self, prompt: Option<&Path>) -> Result<(Cow<'_, StyleMatrix>, f32)> {
        let Some(path) = prompt else {
            let style = self.voices.get(&self.default_voice).with_context(|| {
                format!("Default voice '{}' is not loaded", self.default_voice)
            })?;
            return Ok((Cow::Borrowed(style), self.default_speed()));
        };

        match PromptKind::of(path) {
            PromptKind::Style => {
                let style = load_npy(path)
                    .and_then(StyleMatrix::from_npy)
                    .with_context(|| format!("Bad style prompt: {}", path.display()))?;
                Ok((Cow::Owned(style), self.speed))
            }
            PromptKind::Audio => bail!(
                "Audio prompt {} cannot condition this model, pass a .npy style matrix",
                path.display()
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model
// ─────────────────────────────────────────────────────────────────────────────

/// Files and per-voice metadata needed to build an [`OnnxSpeechModel`].
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub model_path: PathBuf,
    pub voices_path: PathBuf,
    pub speed_priors: HashMap<String, f32>,
    pub voice_aliases: HashMap<String, String>,
}

/// The loaded graph and its voices.
#[cfg_attr(not(feature = "espeak"), allow(dead_code))]
pub struct OnnxSpeechModel {
    session: Mutex<Session>,
    bank: VoiceBank,
}

impl std::fmt::Debug for OnnxSpeechModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxSpeechModel")
            .field("default_voice", &self.bank.default_voice)
            .field("speed", &self.bank.speed)
            .field("voices", &self.bank.names)
            .finish_non_exhaustive()
    }
}

impl OnnxSpeechModel {
    /// Build an inference session on `device` and load the voice table.
    ///
    /// `voice` becomes the default (aliases are honoured) and must exist.
    pub fn load(files: ModelFiles, device: Device, voice: &str, speed: f32) -> Result<Self> {
        let session = build_session(&files.model_path, device)?;

        let raw = load_npz(&files.voices_path)
            .with_context(|| format!("Cannot load voices: {}", files.voices_path.display()))?;
        let bank = VoiceBank::new(raw, files.speed_priors, &files.voice_aliases, voice, speed)?;

        info!(
            model = %files.model_path.display(),
            voices = bank.names.len(),
            voice = %bank.default_voice,
            ?device,
            "ONNX speech model loaded"
        );

        Ok(Self { session: Mutex::new(session), bank })
    }

    /// Names of the voices shipped with the model, sorted.
    pub fn voices(&self) -> &[String] {
        &self.bank.names
    }

    /// Voice used when a request carries no reference.
    pub fn default_voice(&self) -> &str {
        &self.bank.default_voice
    }

    /// One forward pass: IPA → samples, tail trimmed.
    #[cfg_attr(not(feature = "espeak"), allow(dead_code))]
    fn infer(&self, ipa: &str, style: &[f32], speed: f32) -> Result<Vec<f32>> {
        let ids = ipa_to_ids(ipa);
        let seq_len = ids.len();

        let t_ids = Tensor::<i64>::from_array(([1usize, seq_len], ids))
            .context("Failed to build input_ids tensor")?;
        let t_style = Tensor::<f32>::from_array(([1usize, style.len()], style.to_vec()))
            .context("Failed to build style tensor")?;
        let t_speed = Tensor::<f32>::from_array(([1usize], vec![speed]))
            .context("Failed to build speed tensor")?;

        let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
        let outputs = session
            .run(ort::inputs![t_ids, t_style, t_speed])
            .context("ONNX inference failed")?;

        // Extraction copies the waveform into host memory.
        let (_shape, audio) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract audio tensor")?;
        let keep = audio.len().saturating_sub(TAIL_TRIM);
        Ok(audio[..keep].to_vec())
    }
}

fn build_session(model_path: &Path, device: Device) -> Result<Session> {
    session_builder(device)?
        .commit_from_file(model_path)
        .with_context(|| format!("Cannot load ONNX model: {}", model_path.display()))
}

fn session_builder(device: Device) -> Result<SessionBuilder> {
    let builder = Session::builder().context("Failed to create ORT session builder")?;
    match device {
        Device::Cpu => Ok(builder),
        #[cfg(feature = "cuda")]
        Device::Cuda => {
            use ort::execution_providers::CUDAExecutionProvider;
            builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e| anyhow::anyhow!("Cannot register CUDA execution provider: {e}"))
        }
        #[cfg(not(feature = "cuda"))]
        Device::Cuda => bail!("device \"cuda\" requested but this build lacks the `cuda` feature"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Text → audio
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "espeak")]
mod text {
    use tracing::debug;

    use super::*;
    use crate::model::{phonemize::phonemize, SpeechModel};

    impl OnnxSpeechModel {
        fn synthesize(&self, text: &str, style: &StyleMatrix, speed: f32) -> Result<Vec<f32>> {
            let mut audio = Vec::new();
            for chunk in chunk_text(text, CHUNK_MAX_CHARS) {
                let ipa = phonemize(&chunk)
                    .with_context(|| format!("Phonemisation failed for {:?}", chunk))?;
                audio.extend(self.infer(&ipa, style.row(chunk.len()), speed)?);
            }
            Ok(audio)
        }
    }

    impl SpeechModel for OnnxSpeechModel {
        fn sample_rate(&self) -> u32 {
            SAMPLE_RATE
        }

        fn generate(&self, text: &str, prompt: Option<&Path>) -> Result<Vec<f32>> {
            let (style, speed) = self.bank.select(prompt)?;
            if let Some(path) = prompt {
                debug!(prompt = %path.display(), "cloning voice from style matrix");
            }
            self.synthesize(text, &style, speed)
        }

        fn supports_prompt(&self, kind: PromptKind) -> bool {
            kind == PromptKind::Style
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
