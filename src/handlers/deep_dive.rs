//! `/api/deep-dive/*` (§6.1, §4.9).

use crate::models::{DeepDiveContinueResponse, DeepDiveFinalAnalysis, DeepDiveStartRequest, DeepDiveStartResponse, DeepDiveThinkHarderRequest};
use crate::utils::AppResult;
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeepDiveStartRequest>,
) -> AppResult<Json<DeepDiveStartResponse>> {
    Ok(Json(state.deep_dive_engine.start(request).await?))
}

#[derive(Debug, Deserialize)]
pub struct ContinueRequest {
    pub session_id: String,
    pub answer: String,
    pub question_number: i32,
    #[serde(default)]
    pub fallback_model: Option<String>,
}

pub async fn continue_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContinueRequest>,
) -> AppResult<Json<DeepDiveContinueResponse>> {
    let response = state
        .deep_dive_engine
        .continue_session(&request.session_id, &request.answer, request.question_number, request.fallback_model.as_deref())
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub session_id: String,
    #[serde(default)]
    pub final_answer: Option<String>,
    #[serde(default)]
    pub fallback_model: Option<String>,
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompleteRequest>,
) -> AppResult<Json<DeepDiveFinalAnalysis>> {
    let analysis = state
        .deep_dive_engine
        .complete(&request.session_id, request.final_answer.as_deref(), request.fallback_model.as_deref())
        .await?;
    Ok(Json(analysis))
}

#[derive(Debug, Deserialize)]
pub struct AskMoreRequest {
    pub session_id: String,
    #[serde(default = "default_current_confidence")]
    pub current_confidence: f64,
    #[serde(default = "default_target_confidence")]
    pub target_confidence: f64,
}

fn default_current_confidence() -> f64 {
    0.0
}

fn default_target_confidence() -> f64 {
    90.0
}

pub async fn ask_more(State(state): State<Arc<AppState>>, Json(request): Json<AskMoreRequest>) -> AppResult<Json<Value>> {
    let result = state
        .deep_dive_engine
        .ask_more(&request.session_id, request.current_confidence, request.target_confidence)
        .await?;
    Ok(Json(result))
}

pub async fn think_harder(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<DeepDiveThinkHarderRequest>,
) -> AppResult<Json<crate::models::DeepDiveEnhancement>> {
    let result = state.deep_dive_engine.think_harder(&session_id, request.model.as_deref()).await?;
    Ok(Json(result))
}

pub async fn ultra_think(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<DeepDiveThinkHarderRequest>,
) -> AppResult<Json<crate::models::DeepDiveEnhancement>> {
    let result = state.deep_dive_engine.ultra_think(&session_id, request.model.as_deref()).await?;
    Ok(Json(result))
}

/// `GET /api/debug/session/{id}` — raw session row, for operators inspecting
/// `internal_state`/`questions[]` outside the domain DTOs (§6.1).
pub async fn debug_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> AppResult<Json<crate::models::DeepDiveSession>> {
    Ok(Json(state.deep_dive_engine.debug_session(&session_id).await?))
}
