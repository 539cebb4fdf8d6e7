//! PhotoSession, PhotoUpload, PhotoAnalysis, PhotoReminder (§3, §4.11).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PhotoSession {
    pub id: String,
    pub user_id: String,
    pub condition_name: String,
    pub description: String,
    pub is_sensitive: bool,
    pub created_at: DateTime<Utc>,
    pub last_photo_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoCategory {
    MedicalNormal,
    MedicalSensitive,
    MedicalGore,
    Unclear,
    NonMedical,
    Inappropriate,
}

impl PhotoCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MedicalNormal => "medical_normal",
            Self::MedicalSensitive => "medical_sensitive",
            Self::MedicalGore => "medical_gore",
            Self::Unclear => "unclear",
            Self::NonMedical => "non_medical",
            Self::Inappropriate => "inappropriate",
        }
    }

    pub fn is_analyzable(&self) -> bool {
        matches!(self, Self::MedicalNormal | Self::MedicalSensitive | Self::MedicalGore)
    }

    pub fn is_sensitive(&self) -> bool {
        matches!(self, Self::MedicalSensitive)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PhotoUpload {
    pub id: String,
    pub session_id: String,
    pub category: String,
    pub storage_url: Option<String>,
    pub temporary_data: Option<String>,
    pub file_metadata_json: String,
    pub is_followup: bool,
    pub quality_score: Option<f64>,
    pub followup_notes: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PhotoAnalysis {
    pub id: String,
    pub session_id: String,
    pub photo_ids_json: String,
    pub analysis_data_json: String,
    pub model_used: String,
    pub confidence_score: f64,
    pub is_sensitive: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub comparison_json: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PhotoAnalysis {
    pub fn photo_ids(&self) -> Vec<String> {
        serde_json::from_str(&self.photo_ids_json).unwrap_or_default()
    }

    pub fn analysis_data(&self) -> serde_json::Value {
        serde_json::from_str(&self.analysis_data_json).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PhotoReminder {
    pub session_id: String,
    pub analysis_id: String,
    pub user_id: String,
    pub enabled: bool,
    pub interval_days: i32,
    pub reminder_method: String,
    pub next_reminder_date: DateTime<Utc>,
    pub ai_reasoning: String,
    pub last_sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoAnalyzeRequest {
    pub session_id: String,
    pub photo_ids: Vec<String>,
    pub context: Option<String>,
    #[serde(default)]
    pub comparison_photo_ids: Option<Vec<String>>,
    #[serde(default)]
    pub temporary_analysis: bool,
}

/// Output of SmartPhotoBatcher (§4.11.3).
#[derive(Debug, Clone, Serialize)]
pub struct SmartBatchResult {
    pub selected: Vec<PhotoUpload>,
    pub selection_info: SelectionInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionInfo {
    pub total_photos: usize,
    pub photos_shown: usize,
    pub selection_reasoning: Vec<String>,
    pub omitted_date_ranges: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Output of ProgressionAnalyzer (§4.11.4).
#[derive(Debug, Clone, Serialize)]
pub struct ProgressionAnalysis {
    pub velocity_mm_per_week: f64,
    pub acceleration: String,
    pub projected_size_30d: f64,
    pub overall_trend: String,
    pub monitoring_phase: String,
    pub risk_indicators: RiskIndicators,
    pub overall_risk_level: String,
}

/// `ProgressionAnalyzer::analyze`'s return (§4.11.4, §8: "with 1 analysis: returns
/// insufficient_data"). Mirrors the donor's `{"status": "insufficient_data", "message":
/// "..."}` sentinel rather than fabricating zero-valued metrics for an undersized series.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProgressionResult {
    InsufficientData { status: String, message: String },
    Analysis(ProgressionAnalysis),
}

impl ProgressionResult {
    pub fn insufficient_data() -> Self {
        Self::InsufficientData {
            status: "insufficient_data".to_string(),
            message: "Need at least 2 analyses for progression analysis".to_string(),
        }
    }

    pub fn as_analysis(&self) -> Option<&ProgressionAnalysis> {
        match self {
            Self::Analysis(a) => Some(a),
            Self::InsufficientData { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct RiskIndicators {
    pub rapid_growth: bool,
    pub color_darkening: bool,
    pub border_irregularity_increase: bool,
    pub new_colors_appearing: bool,
    pub asymmetry_increasing: bool,
}

impl RiskIndicators {
    pub fn true_count(&self) -> u32 {
        [
            self.rapid_growth,
            self.color_darkening,
            self.border_irregularity_increase,
            self.new_colors_appearing,
            self.asymmetry_increasing,
        ]
        .iter()
        .filter(|b| **b)
        .count() as u32
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FollowUpSuggestion {
    pub interval_days: i32,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_note: Option<String>,
}
