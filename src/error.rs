//! Request-level error type.
//!
//! Engine and loader code returns [`anyhow::Result`]; everything that can end
//! a speech request is funnelled into [`SynthesisError`] so the HTTP layer can
//! pick a status code without string matching.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Why a `generate_speech` request failed.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// The request body is well-formed but unusable (e.g. empty text).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A storage key escapes the storage root or is otherwise malformed.
    #[error("invalid storage key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// The body is not a JSON `SynthesisRequest`; `status` is the one axum
    /// picked for the rejection (400, 413, 415 or 422).
    #[error("{message}")]
    MalformedBody { status: StatusCode, message: String },

    /// The reference exists but the loaded model cannot clone from it.
    #[error("reference voice {key} cannot be used by this model: {reason}")]
    UnsupportedReference { key: String, reason: &'static str },

    /// The reference voice clip does not exist under the storage root.
    #[error("prompt audio not found at {key}")]
    VoiceNotFound { key: String },

    /// Inference failed, or a style prompt could not be parsed.
    #[error("speech generation failed: {0:#}")]
    Model(anyhow::Error),

    /// The generated samples could not be encoded as WAV.
    #[error("WAV encoding failed: {0}")]
    Encode(#[from] hound::Error),

    /// Writing the output object failed.
    #[error("storage write failed: {0}")]
    Storage(#[from] std::io::Error),

    /// The blocking synthesis task panicked or was cancelled.
    #[error("synthesis task aborted: {0}")]
    TaskAborted(String),
}

impl SynthesisError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// HTTP status reported to the caller for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedBody { status, .. } => *status,
            Self::InvalidInput(_) | Self::InvalidKey { .. } | Self::UnsupportedReference { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::VoiceNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Model(_) | Self::Encode(_) | Self::Storage(_) | Self::TaskAborted(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for SynthesisError {
    fn from(rejection: JsonRejection) -> Self {
        Self::MalformedBody { status: rejection.status(), message: rejection.body_text() }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for SynthesisError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "speech request failed");
        } else {
            tracing::warn!(error = %self, "speech request rejected");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
