//! `/api/chat` and `/api/health-story` (§6.1, §4.7).

use crate::models::{ChatRequest, ChatResponse};
use crate::services::model_selector::Endpoint;
use crate::utils::{AppResult, UserContext};
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub async fn chat(
    State(state): State<Arc<AppState>>,
    _ctx: UserContext,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    let response = state.chat_engine.chat(request).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct HealthStoryRequest {
    pub user_id: String,
    #[serde(default)]
    pub focus: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthStoryResponse {
    pub narrative: String,
    pub model_used: String,
}

/// Narrative health summary woven from a user's aggregated context (§4.7's
/// `aggregate_user_context`), not a structured assessment in its own right.
pub async fn health_story(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HealthStoryRequest>,
) -> AppResult<Json<HealthStoryResponse>> {
    let focus = request.focus.unwrap_or_else(|| "overall health trajectory".to_string());
    let history = state
        .context_manager
        .aggregate_user_context(&request.user_id, &focus, Some(&state.orchestrator))
        .await
        .map_err(crate::utils::AppError::Database)?;
    let tier = state.tier_resolver.tier(&request.user_id).await;

    let prompt = format!(
        "Write a warm, plain-language narrative health story for this patient, focused on {focus}. \
         Use their history below. Respond as JSON: {{\"narrative\": \"...\"}}.\n\nHistory: {history}"
    );
    let messages = vec![json!({"role": "system", "content": prompt})];
    let result = state
        .orchestrator
        .call_with_fallback(&messages, tier, Endpoint::Chat, false, 0.6, 1200)
        .await
        .map_err(|e| crate::utils::AppError::ExternalService(e.to_string()))?;

    let narrative = result
        .parsed_content
        .as_ref()
        .and_then(|v| v["narrative"].as_str())
        .map(|s| s.to_string())
        .unwrap_or(result.content);

    Ok(Json(HealthStoryResponse { narrative, model_used: result.model }))
}
