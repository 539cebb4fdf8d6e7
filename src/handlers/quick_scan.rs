//! `/api/quick-scan/*` (§6.1, §4.10).

use crate::models::{QuickScanRequest, QuickScanResponse};
use crate::utils::AppResult;
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;
use std::sync::Arc;

pub async fn scan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuickScanRequest>,
) -> AppResult<Json<QuickScanResponse>> {
    let response = state.quick_scan_engine.scan(request).await?;
    Ok(Json(response))
}

pub async fn think_harder(State(state): State<Arc<AppState>>, Path(scan_id): Path<String>) -> AppResult<Json<Value>> {
    Ok(Json(state.quick_scan_engine.think_harder(&scan_id).await?))
}

pub async fn o4_mini(State(state): State<Arc<AppState>>, Path(scan_id): Path<String>) -> AppResult<Json<Value>> {
    Ok(Json(state.quick_scan_engine.o4_mini(&scan_id).await?))
}

pub async fn ultra_think(State(state): State<Arc<AppState>>, Path(scan_id): Path<String>) -> AppResult<Json<Value>> {
    Ok(Json(state.quick_scan_engine.ultra_think(&scan_id).await?))
}

pub async fn ask_more(State(state): State<Arc<AppState>>, Path(scan_id): Path<String>) -> AppResult<Json<Vec<String>>> {
    Ok(Json(state.quick_scan_engine.ask_more(&scan_id).await?))
}
