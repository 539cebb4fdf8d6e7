//! `/api/tracking/*` (§6.1, §4.8).

use crate::models::{
    AddDataPointRequest, ChartResponse, ConfigureTrackingRequest, DashboardResponse, SuggestTrackingRequest, TrackingConfiguration,
    TrackingDataPoint, TrackingSuggestion,
};
use crate::utils::AppResult;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

pub async fn suggest(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SuggestTrackingRequest>,
) -> AppResult<Json<TrackingSuggestion>> {
    Ok(Json(state.tracking_engine.suggest_from_source(request).await?))
}

pub async fn configure(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConfigureTrackingRequest>,
) -> AppResult<Json<TrackingConfiguration>> {
    let config = state
        .tracking_engine
        .configure(
            &request.suggestion_id,
            request.metric_name.as_deref(),
            request.y_axis_label.as_deref(),
            request.show_on_homepage.unwrap_or(false),
        )
        .await?;
    Ok(Json(config))
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(suggestion_id): Path<String>,
) -> AppResult<Json<TrackingConfiguration>> {
    Ok(Json(state.tracking_engine.approve_suggestion(&suggestion_id).await?))
}

pub async fn add_data_point(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddDataPointRequest>,
) -> AppResult<Json<TrackingDataPoint>> {
    let point = state
        .tracking_engine
        .add_data_point(&request.configuration_id, &request.user_id, request.value, request.notes.as_deref())
        .await?;
    Ok(Json(point))
}

pub async fn dashboard(State(state): State<Arc<AppState>>, Path(user_id): Path<String>) -> AppResult<Json<DashboardResponse>> {
    Ok(Json(state.tracking_engine.dashboard(&user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    30
}

pub async fn chart(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
    Query(query): Query<ChartQuery>,
) -> AppResult<Json<ChartResponse>> {
    Ok(Json(state.tracking_engine.chart(&config_id, query.days).await?))
}

pub async fn configurations(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<TrackingConfiguration>>> {
    Ok(Json(state.tracking_engine.configurations(&user_id).await?))
}

pub async fn data_points(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
) -> AppResult<Json<Vec<TrackingDataPoint>>> {
    Ok(Json(state.tracking_engine.data_points(&config_id).await?))
}

pub async fn past_scans(State(state): State<Arc<AppState>>, Path(user_id): Path<String>) -> AppResult<Json<Vec<serde_json::Value>>> {
    Ok(Json(state.tracking_engine.past_scans(&user_id).await?))
}

pub async fn past_dives(State(state): State<Arc<AppState>>, Path(user_id): Path<String>) -> AppResult<Json<Vec<serde_json::Value>>> {
    Ok(Json(state.tracking_engine.past_dives(&user_id).await?))
}
