//! DeepDiveSession (§3, §4.9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeepDiveStatus {
    Active,
    AnalysisReady,
    Completed,
    Abandoned,
}

impl DeepDiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::AnalysisReady => "analysis_ready",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "analysis_ready" => Self::AnalysisReady,
            "completed" => Self::Completed,
            "abandoned" => Self::Abandoned,
            _ => Self::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepDiveQuestion {
    pub question_number: i32,
    pub question: String,
    pub answer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DeepDiveSession {
    pub id: String,
    pub user_id: Option<String>,
    pub body_parts_json: String,
    pub form_data_json: String,
    pub model_used: String,
    pub questions_json: String,
    pub current_step: i32,
    pub internal_state_json: String,
    pub last_question: String,
    pub status: String,
    pub final_analysis_json: Option<String>,
    pub final_confidence: Option<f64>,
    pub initial_questions_count: Option<i32>,
    pub additional_questions_json: String,
    pub enhanced_analysis_json: Option<String>,
    pub ultra_analysis_json: Option<String>,
    pub allow_more_questions: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeepDiveSession {
    pub fn questions(&self) -> Vec<DeepDiveQuestion> {
        serde_json::from_str(&self.questions_json).unwrap_or_default()
    }

    pub fn status_enum(&self) -> DeepDiveStatus {
        DeepDiveStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeepDiveStartRequest {
    pub body_parts: Vec<String>,
    #[serde(default)]
    pub form_data: serde_json::Value,
    pub user_id: Option<String>,
    pub preferred_model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeepDiveStartResponse {
    pub session_id: String,
    pub question: String,
    pub question_number: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeepDiveContinueRequest {
    pub session_id: String,
    pub answer: String,
    pub question_number: i32,
    pub fallback_model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DeepDiveContinueResponse {
    NextQuestion {
        question: String,
        question_number: i32,
        is_final_question: bool,
        current_confidence: i32,
        confidence_threshold: i32,
        questions_remaining: i32,
    },
    ReadyForAnalysis {
        ready_for_analysis: bool,
        question: Option<String>,
        current_confidence: i32,
        questions_completed: i32,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeepDiveThinkHarderRequest {
    #[serde(default)]
    pub model: Option<String>,
}

/// Result of `think_harder`/`ultra_think`: a fresh pass over the whole case plus the
/// delta against the session's `final_confidence` at the time the pass ran.
#[derive(Debug, Clone, Serialize)]
pub struct DeepDiveEnhancement {
    pub analysis: DeepDiveFinalAnalysis,
    pub confidence: i32,
    pub confidence_improvement: i32,
}

/// §4.9's final-analysis shape.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeepDiveFinalAnalysis {
    #[serde(rename = "primaryCondition")]
    pub primary_condition: String,
    pub likelihood: String,
    pub symptoms: Vec<String>,
    pub recommendations: Vec<String>,
    pub urgency: String,
    pub differentials: Vec<String>,
    #[serde(rename = "redFlags")]
    pub red_flags: Vec<String>,
    #[serde(rename = "selfCare")]
    pub self_care: Vec<String>,
    pub timeline: String,
    #[serde(rename = "followUp")]
    pub follow_up: String,
    pub confidence: i32,
    pub reasoning_snippets: Vec<String>,
}
