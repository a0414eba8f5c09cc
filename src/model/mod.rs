//! Model Host — the process-resident speech model.
//!
//! The server builds exactly one model at startup and shares it read-only
//! with every request through a [`ModelHandle`].  Nothing here is global: the
//! handle is passed into [`SpeechService`](crate::service::SpeechService)
//! explicitly, which also lets tests swap in a stub.

use std::{path::Path, sync::Arc};

use anyhow::Result;

pub mod npz;
pub mod onnx;
#[cfg(feature = "espeak")]
pub mod phonemize;
pub mod tokenize;

/// A loaded text-to-speech model.
///
/// Implementations must be usable from several blocking threads at once;
/// any internal mutable state (e.g. an inference session) is theirs to guard.
pub trait SpeechModel: Send + Sync {
    /// Native output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Synthesise `text` as mono samples in `[-1.0, 1.0]`, in host memory.
    ///
    /// `prompt` is an existing file on the local filesystem holding the voice
    /// to clone.  `None` means the model's default voice.
    fn generate(&self, text: &str, prompt: Option<&Path>) -> Result<Vec<f32>>;

    /// Whether this model can clone a voice from a prompt of `kind`.
    ///
    /// Checked before [`generate`](Self::generate) so an unusable reference
    /// is refused up front instead of silently producing another voice.
    fn supports_prompt(&self, kind: PromptKind) -> bool {
        let _ = kind;
        true
    }
}

/// What a reference file holds, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// A precomputed style matrix (`.npy`).
    Style,
    /// A recorded voice clip (anything else, normally `.wav`).
    Audio,
}

impl PromptKind {
    pub fn of(path: &Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("npy") => Self::Style,
            _ => Self::Audio,
        }
    }
}

/// Shared, immutable handle to the loaded model.
pub type ModelHandle = Arc<dyn SpeechModel>;
