//! TrackingSuggestion, TrackingConfiguration, TrackingDataPoint (§3, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingType {
    Severity,
    Frequency,
    Duration,
    Occurrence,
}

impl TrackingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Severity => "severity",
            Self::Frequency => "frequency",
            Self::Duration => "duration",
            Self::Occurrence => "occurrence",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "frequency" => Self::Frequency,
            "duration" => Self::Duration,
            "occurrence" => Self::Occurrence,
            _ => Self::Severity,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrackingSuggestion {
    pub id: String,
    pub user_id: String,
    pub source_type: String,
    pub source_id: String,
    pub metric_name: String,
    pub y_axis_label: String,
    pub y_axis_type: String,
    pub y_axis_min: Option<f64>,
    pub y_axis_max: Option<f64>,
    pub tracking_type: String,
    pub symptom_keywords_json: String,
    pub suggested_questions_json: String,
    pub ai_reasoning: String,
    pub confidence_score: f64,
    pub action_taken: Option<String>,
    pub actioned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrackingConfiguration {
    pub id: String,
    pub suggestion_id: Option<String>,
    pub user_id: String,
    pub metric_name: String,
    pub y_axis_label: String,
    pub y_axis_type: String,
    pub y_axis_min: Option<f64>,
    pub y_axis_max: Option<f64>,
    pub tracking_type: String,
    pub show_on_homepage: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrackingDataPoint {
    pub id: String,
    pub configuration_id: String,
    pub user_id: String,
    pub value: f64,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestTrackingRequest {
    pub source_type: String,
    pub source_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigureTrackingRequest {
    pub suggestion_id: String,
    #[serde(default)]
    pub metric_name: Option<String>,
    #[serde(default)]
    pub y_axis_label: Option<String>,
    #[serde(default)]
    pub show_on_homepage: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddDataPointRequest {
    pub configuration_id: String,
    pub user_id: String,
    pub value: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartResponse {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub stats: ChartStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardResponse {
    pub configurations: Vec<TrackingConfiguration>,
    pub pending_suggestions: Vec<TrackingSuggestion>,
}
