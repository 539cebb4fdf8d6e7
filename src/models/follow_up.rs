//! AssessmentFollowUp / FollowUpEvent — the temporal follow-up chain engine's entities (§3, §4.13).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct AssessmentFollowUp {
    pub id: String,
    pub chain_id: String,
    pub parent_follow_up_id: Option<String>,
    pub source_type: String,
    pub source_id: String,
    pub follow_up_number: i32,
    pub base_responses_json: String,
    pub ai_questions_json: String,
    pub analysis_result_json: String,
    pub primary_assessment: String,
    pub confidence_score: f64,
    pub confidence_change: f64,
    pub assessment_evolution_json: String,
    pub days_since_original: i32,
    pub created_at: DateTime<Utc>,
}

/// §4.13.1's enforced analysis shape; absent fields are defaulted by the engine before persist.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FollowUpAnalysis {
    pub assessment: FollowUpAssessment,
    pub assessment_evolution: AssessmentEvolution,
    pub progression_narrative: String,
    pub pattern_insights: PatternInsights,
    pub treatment_efficacy: String,
    pub recommendations: FollowUpRecommendations,
    pub confidence: f64,
    pub primary_assessment: String,
    pub urgency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FollowUpAssessment {
    pub condition: String,
    pub confidence: f64,
    pub severity: String,
    pub progression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssessmentEvolution {
    pub original_assessment: String,
    pub current_assessment: String,
    pub confidence_change: f64,
    pub diagnosis_refined: bool,
    pub key_discoveries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PatternInsights {
    pub discovered_patterns: Vec<String>,
    pub concerning_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FollowUpRecommendations {
    pub immediate: Vec<String>,
    pub this_week: Vec<String>,
    pub consider: Vec<String>,
    pub next_follow_up: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FollowUpEvent {
    pub id: String,
    pub chain_id: String,
    pub event_type: String,
    pub event_data_json: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowUpQuestionsQuery {
    pub assessment_type: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FollowUpQuestionsResponse {
    pub base_questions: Vec<String>,
    pub ai_questions: Vec<String>,
    pub days_since_original: i64,
    pub days_since_last: Option<i64>,
    pub has_active_tracking: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitFollowUpRequest {
    pub assessment_id: String,
    pub assessment_type: String,
    #[serde(default)]
    pub chain_id: Option<String>,
    pub user_id: Option<String>,
    pub responses: serde_json::Value,
    #[serde(default)]
    pub medical_visit: Option<MedicalVisitInfo>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MedicalVisitInfo {
    #[serde(default)]
    pub assessment: Option<String>,
    #[serde(default)]
    pub treatments: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitFollowUpResponse {
    pub follow_up_id: String,
    pub chain_id: String,
    pub follow_up_number: i32,
    pub analysis: FollowUpAnalysis,
    pub confidence_change: f64,
    pub milestones: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplainMedicalVisitRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExplainMedicalVisitResponse {
    pub plain_language: String,
}
