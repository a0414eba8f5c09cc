//! # tts-generator
//!
//! An HTTP service that turns text into speech and stores the result as a WAV
//! file in a mounted object store.
//!
//! ```text
//! POST /generate_speech  {"text": "Hello world", "voice_S3_key": null}
//!                     →  {"s3_key": "tts/6f1c…-….wav"}
//! ```
//!
//! ## Pieces
//! | Module      | Role                                                        |
//! |-------------|-------------------------------------------------------------|
//! | [`model`]   | Model Host: the [`SpeechModel`] trait and the ONNX backend  |
//! | [`hub`]     | Locates the pretrained model (HuggingFace Hub or local dir) |
//! | [`service`] | Request Handler: validate → generate → encode → store       |
//! | [`storage`] | Key ↔ path mapping under the mount, atomic writes           |
//! | [`audio`]   | In-memory WAV encoding                                      |
//! | [`server`]  | Axum router, credential check, graceful shutdown            |
//!
//! ## Using the service without HTTP
//!
//! ```no_run
//! use tts_generator::{SpeechService, Storage, SynthesisRequest};
//!
//! # fn run(model: tts_generator::ModelHandle) -> anyhow::Result<()> {
//! let service = SpeechService::new(model, Storage::new("/s3-mount", "tts"));
//! let response = service.generate_speech(&SynthesisRequest::new("Hello world"))?;
//! println!("{}", response.s3_key);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//! - `espeak` — phonemization through libespeak-ng; required for the ONNX
//!   backend to accept text.
//! - `cuda` — ONNX Runtime CUDA execution provider.
//! - `server` — builds the `tts-server` binary.

pub mod audio;
pub mod config;
pub mod error;
pub mod hub;
pub mod logging;
pub mod model;
pub mod server;
pub mod service;
pub mod storage;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use config::ServiceConfig;
pub use error::SynthesisError;
pub use model::{ModelHandle, SpeechModel};
pub use service::{SpeechService, SynthesisRequest, SynthesisResponse};
pub use storage::Storage;
