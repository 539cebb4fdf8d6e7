//! `/api/email/*` (§6.1, §4.12).

use crate::models::{SendReportRequest, SendReportResponse, SendScanRequest, SendScanResponse, SendgridWebhookEvent};
use crate::utils::AppResult;
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// Queues the report email and, on a fresh enqueue, spawns its delivery as a detached
/// task so the caller isn't held open for the SendGrid round trip.
pub async fn send_report(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendReportRequest>,
) -> AppResult<Json<SendReportResponse>> {
    let (response, aggregate_id) = state.email_queue.send_report(request).await?;

    if !aggregate_id.is_empty() {
        let queue_id = response.message_id.clone();
        let email_queue = Arc::clone(&state.email_queue);
        tokio::spawn(async move {
            if let Err(e) = email_queue.process_queue_item(&queue_id, &aggregate_id).await {
                tracing::warn!(queue_id = %queue_id, error = %e, "background email delivery failed");
            }
        });
    }

    Ok(Json(response))
}

/// Synchronous send of quick-scan results, no attachment, no persistent queue row (§4.12).
pub async fn send_scan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendScanRequest>,
) -> AppResult<Json<SendScanResponse>> {
    let message_id = state
        .email_queue
        .send_scan(&request.user_id, &request.recipient, &request.scan_id, &request.data)
        .await?;
    Ok(Json(SendScanResponse { success: true, message_id }))
}

pub async fn webhook(
    State(state): State<Arc<AppState>>,
    Json(events): Json<Vec<SendgridWebhookEvent>>,
) -> AppResult<Json<Value>> {
    let processed = state.email_queue.webhook(&events).await?;
    Ok(Json(json!({"processed": processed})))
}
