//! Report / ReportAnalysis — ReportOrchestrator's entities (§3, §4.14).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Report {
    pub id: String,
    pub user_id: String,
    pub analysis_id: Option<String>,
    pub report_type: String,
    pub specialty: Option<String>,
    pub report_data_json: String,
    pub executive_summary: String,
    pub confidence_score: f64,
    pub model_used: String,
    pub time_range_json: Option<String>,
    pub doctor_reviewed: bool,
    pub doctor_notes_json: Option<String>,
    pub share_token: Option<String>,
    pub share_expires_at: Option<DateTime<Utc>>,
    pub rating_sum: i64,
    pub rating_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn average_rating(&self) -> Option<f64> {
        if self.rating_count == 0 { None } else { Some(self.rating_sum as f64 / self.rating_count as f64) }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ReportAnalysis {
    pub id: String,
    pub user_id: String,
    pub recommended_type: String,
    pub report_config_json: String,
    pub quick_scan_ids_json: Option<String>,
    pub deep_dive_ids_json: Option<String>,
    pub photo_session_ids_json: Option<String>,
    pub general_assessment_ids_json: Option<String>,
    pub general_deep_dive_ids_json: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The two data-gathering modes of §4.14. `Selected` lists are distinct from `None`:
/// an empty `Vec` means "load nothing of that kind", never "load all".
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DataGatheringScope {
    #[serde(default)]
    pub quick_scan_ids: Option<Vec<String>>,
    #[serde(default)]
    pub deep_dive_ids: Option<Vec<String>>,
    #[serde(default)]
    pub photo_session_ids: Option<Vec<String>>,
    #[serde(default)]
    pub general_assessment_ids: Option<Vec<String>>,
    #[serde(default)]
    pub general_deep_dive_ids: Option<Vec<String>>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
}

impl DataGatheringScope {
    /// Selected mode is in effect whenever the caller supplied any explicit id list.
    pub fn is_selected_mode(&self) -> bool {
        self.quick_scan_ids.is_some()
            || self.deep_dive_ids.is_some()
            || self.photo_session_ids.is_some()
            || self.general_assessment_ids.is_some()
            || self.general_deep_dive_ids.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeReportRequest {
    pub user_id: String,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub symptom_focus: Option<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeReportResponse {
    pub analysis_id: String,
    pub recommended_type: String,
    pub recommended_endpoint: String,
    pub time_range: TimeRange,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateReportRequest {
    pub user_id: String,
    #[serde(default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub scope: DataGatheringScope,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateReportResponse {
    pub report_id: String,
    pub report_data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoctorNotesRequest {
    pub notes: String,
    pub reviewer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShareReportRequest {
    #[serde(default = "default_share_ttl_hours")]
    pub ttl_hours: i64,
}

fn default_share_ttl_hours() -> i64 {
    72
}

#[derive(Debug, Clone, Serialize)]
pub struct ShareReportResponse {
    pub share_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateReportRequest {
    pub rating: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateReportResponse {
    pub average_rating: f64,
    pub rating_count: i64,
}
