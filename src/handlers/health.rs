//! Liveness probes. Every domain router carries its own `/health` per §6.1; this is the
//! top-level `/api/health`.

use axum::Json;
use serde_json::{json, Value};

pub async fn liveness() -> Json<Value> {
    Json(json!({"status": "success", "service": "oracle-health"}))
}
