//! `/api/report/*` (§6.1, §4.14).

use crate::models::{
    AnalyzeReportRequest, AnalyzeReportResponse, DoctorNotesRequest, GenerateReportRequest, GenerateReportResponse, Report,
    RateReportRequest, RateReportResponse, ShareReportRequest, ShareReportResponse,
};
use crate::utils::AppResult;
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeReportRequest>,
) -> AppResult<Json<AnalyzeReportResponse>> {
    Ok(Json(state.report_orchestrator.analyze(request).await?))
}

macro_rules! generate_handler {
    ($name:ident, $engine_method:ident) => {
        pub async fn $name(
            State(state): State<Arc<AppState>>,
            Json(request): Json<GenerateReportRequest>,
        ) -> AppResult<Json<GenerateReportResponse>> {
            Ok(Json(state.report_orchestrator.$engine_method(request).await?))
        }
    };
}

generate_handler!(generate_comprehensive, generate_comprehensive);
generate_handler!(generate_symptom_timeline, generate_symptom_timeline);
generate_handler!(generate_photo_progression, generate_photo_progression);
generate_handler!(generate_30_day, generate_30_day);
generate_handler!(generate_annual, generate_annual);
generate_handler!(generate_annual_summary, generate_annual_summary);

pub async fn generate_specialty(
    State(state): State<Arc<AppState>>,
    Path(specialty): Path<String>,
    Json(request): Json<GenerateReportRequest>,
) -> AppResult<Json<GenerateReportResponse>> {
    Ok(Json(state.report_orchestrator.generate_specialty(&specialty, request).await?))
}

pub async fn get(State(state): State<Arc<AppState>>, Path(report_id): Path<String>) -> AppResult<Json<Report>> {
    Ok(Json(state.report_orchestrator.get(&report_id).await?))
}

pub async fn list(State(state): State<Arc<AppState>>, Path(user_id): Path<String>) -> AppResult<Json<Vec<Report>>> {
    Ok(Json(state.report_orchestrator.list(&user_id).await?))
}

pub async fn doctor_notes(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
    Json(request): Json<DoctorNotesRequest>,
) -> AppResult<Json<Report>> {
    Ok(Json(state.report_orchestrator.doctor_notes(&report_id, request).await?))
}

pub async fn share(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
    Json(request): Json<ShareReportRequest>,
) -> AppResult<Json<ShareReportResponse>> {
    Ok(Json(state.report_orchestrator.share(&report_id, request).await?))
}

pub async fn rate(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
    Json(request): Json<RateReportRequest>,
) -> AppResult<Json<RateReportResponse>> {
    Ok(Json(state.report_orchestrator.rate(&report_id, request).await?))
}
