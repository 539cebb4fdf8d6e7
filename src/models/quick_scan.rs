//! QuickScan (§3, §4.10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuickScan {
    pub id: String,
    pub user_id: Option<String>,
    pub body_parts_json: String,
    pub is_multi_part: bool,
    pub form_data_json: String,
    pub analysis_result_json: String,
    pub confidence_score: f64,
    pub urgency_level: String,
    pub enhanced_analysis_json: Option<String>,
    pub ultra_analysis_json: Option<String>,
    pub follow_up_questions_json: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuickScanRequest {
    pub body_parts: Vec<String>,
    #[serde(default)]
    pub form_data: serde_json::Value,
    pub user_id: Option<String>,
    #[serde(default)]
    pub parts_relationship: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuickScanResponse {
    pub scan_id: String,
    pub analysis: serde_json::Value,
    pub confidence: f64,
    pub urgency_level: String,
    pub what_this_means: String,
    pub immediate_actions: Vec<String>,
}
