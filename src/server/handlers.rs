use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Serialize;

use crate::{
    error::SynthesisError,
    server::state::AppState,
    service::{SynthesisRequest, SynthesisResponse},
};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    sample_rate: u32,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", sample_rate: state.service.sample_rate() })
}

/// `POST /generate_speech`
///
/// Inference blocks for the whole generation, so the pipeline runs on the
/// blocking pool rather than on a runtime worker.  Body rejections are
/// reported in the same `{"error": ...}` shape as every other failure.
pub async fn generate_speech(
    State(state): State<AppState>,
    payload: Result<Json<SynthesisRequest>, JsonRejection>,
) -> Result<Json<SynthesisResponse>, SynthesisError> {
    let Json(request) = payload?;
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || service.generate_speech(&request))
        .await
        .map_err(|e| SynthesisError::TaskAborted(e.to_string()))?
        .map(Json)
}
