//! `/api/photo-analysis/*` (§6.1, §4.11).

use crate::models::{PhotoAnalysis, PhotoAnalyzeRequest, PhotoReminder, PhotoSession, PhotoUpload, ProgressionResult, SmartBatchResult};
use crate::services::photo_pipeline::UploadOutcome;
use crate::utils::AppResult;
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub condition_name: String,
    #[serde(default)]
    pub description: String,
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> AppResult<Json<PhotoSession>> {
    let session = state
        .photo_pipeline
        .create_session(&request.user_id, &request.condition_name, &request.description)
        .await?;
    Ok(Json(session))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<PhotoSession>>> {
    Ok(Json(state.photo_pipeline.list_sessions(&user_id).await?))
}

pub async fn delete_session(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> AppResult<Json<serde_json::Value>> {
    state.photo_pipeline.delete_session(&session_id).await?;
    Ok(Json(serde_json::json!({"status": "success"})))
}

pub async fn session_photos(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> AppResult<Json<Vec<PhotoUpload>>> {
    Ok(Json(state.photo_pipeline.session_photos(&session_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub session_id: String,
    pub user_id: String,
    pub image_base64: String,
    pub mime_type: String,
    #[serde(default)]
    pub is_followup: bool,
    #[serde(default)]
    pub followup_notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadResponse {
    Stored { upload: PhotoUpload },
    RequiresAction { category: String, confidence: f64 },
    Ignored { category: String, confidence: f64 },
}

pub async fn upload(State(state): State<Arc<AppState>>, Json(request): Json<UploadRequest>) -> AppResult<Json<UploadResponse>> {
    let outcome = state
        .photo_pipeline
        .upload(
            &request.session_id,
            &request.user_id,
            &request.image_base64,
            &request.mime_type,
            request.is_followup,
            request.followup_notes.as_deref(),
        )
        .await?;

    let response = match outcome {
        UploadOutcome::Stored(upload) => UploadResponse::Stored { upload },
        UploadOutcome::RequiresAction(cat) => UploadResponse::RequiresAction {
            category: cat.category.as_str().to_string(),
            confidence: cat.confidence,
        },
        UploadOutcome::Ignored(cat) => UploadResponse::Ignored {
            category: cat.category.as_str().to_string(),
            confidence: cat.confidence,
        },
    };
    Ok(Json(response))
}

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    ctx: crate::utils::UserContext,
    Json(request): Json<PhotoAnalyzeRequest>,
) -> AppResult<Json<PhotoAnalysis>> {
    let analysis = state.photo_pipeline.analyze(ctx.user_id.as_deref(), request).await?;
    Ok(Json(analysis))
}

pub async fn session_analyses(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> AppResult<Json<Vec<PhotoAnalysis>>> {
    Ok(Json(state.photo_pipeline.session_analyses(&session_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    #[serde(default = "default_max_photos")]
    pub max_photos: usize,
}

fn default_max_photos() -> usize {
    40
}

pub async fn batch_for_comparison(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    axum::extract::Query(query): axum::extract::Query<BatchQuery>,
) -> AppResult<Json<SmartBatchResult>> {
    Ok(Json(state.photo_pipeline.batch_for_comparison(&session_id, query.max_photos).await?))
}

pub async fn progression(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> AppResult<Json<ProgressionResult>> {
    Ok(Json(state.photo_pipeline.progression(&session_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReminderRequest {
    pub analysis_id: String,
    pub user_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub interval_days: i32,
    #[serde(default = "default_method")]
    pub reminder_method: String,
    #[serde(default)]
    pub ai_reasoning: String,
}

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "email".to_string()
}

pub async fn configure_reminder(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<ReminderRequest>,
) -> AppResult<Json<PhotoReminder>> {
    let reminder = state
        .photo_pipeline
        .configure_reminder(
            &session_id,
            &request.analysis_id,
            &request.user_id,
            request.enabled,
            request.interval_days,
            &request.reminder_method,
            &request.ai_reasoning,
        )
        .await?;
    Ok(Json(reminder))
}

pub async fn suggest_monitoring(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> AppResult<Json<crate::models::FollowUpSuggestion>> {
    Ok(Json(state.photo_pipeline.suggest_monitoring(&session_id).await?))
}
