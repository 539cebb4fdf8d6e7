//! `/api/followup/*` (§6.1, §4.13).

use crate::models::{
    AssessmentFollowUp, ExplainMedicalVisitRequest, ExplainMedicalVisitResponse, FollowUpEvent, FollowUpQuestionsQuery,
    FollowUpQuestionsResponse, SubmitFollowUpRequest, SubmitFollowUpResponse,
};
use crate::utils::AppResult;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use std::sync::Arc;

pub async fn questions(
    State(state): State<Arc<AppState>>,
    Path(assessment_id): Path<String>,
    Query(query): Query<FollowUpQuestionsQuery>,
) -> AppResult<Json<FollowUpQuestionsResponse>> {
    let response = state
        .follow_up_engine
        .questions(&assessment_id, &query.assessment_type, query.user_id.as_deref())
        .await?;
    Ok(Json(response))
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitFollowUpRequest>,
) -> AppResult<Json<SubmitFollowUpResponse>> {
    Ok(Json(state.follow_up_engine.submit(request).await?))
}

pub async fn chain(
    State(state): State<Arc<AppState>>,
    Path(chain_id): Path<String>,
) -> AppResult<Json<(Vec<AssessmentFollowUp>, Vec<FollowUpEvent>)>> {
    let (follow_ups, events) = state.follow_up_engine.chain(&chain_id).await?;
    Ok(Json((follow_ups, events)))
}

pub async fn explain_medical_visit(
    State(state): State<Arc<AppState>>,
    ctx: crate::utils::UserContext,
    Json(request): Json<ExplainMedicalVisitRequest>,
) -> AppResult<Json<ExplainMedicalVisitResponse>> {
    let response = state.follow_up_engine.explain_medical_visit(ctx.user_id.as_deref(), &request.text).await?;
    Ok(Json(response))
}
