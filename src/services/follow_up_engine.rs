//! Temporal follow-up chain engine (§4.13). Ties repeated check-ins on one original
//! assessment into a `chain_id`, asks a blend of fixed and AI-generated questions, and
//! runs a comprehensive re-analysis on submission.

use crate::models::{
    AssessmentFollowUp, ExplainMedicalVisitResponse, FollowUpAnalysis, FollowUpEvent, FollowUpQuestionsResponse,
    SubmitFollowUpRequest, SubmitFollowUpResponse, Tier,
};
use crate::services::llm_orchestrator::LlmOrchestrator;
use crate::services::model_selector::Endpoint;
use crate::services::tier_resolver::TierResolver;
use crate::utils::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

const BASE_QUESTIONS: [&str; 5] = [
    "How are your symptoms today compared to when you were last assessed?",
    "Have you started, stopped, or changed any treatments since then?",
    "Have any new symptoms appeared?",
    "Has anything made your symptoms better or worse?",
    "Have you seen a doctor or other healthcare provider about this since your last assessment?",
];

struct OriginalAssessment {
    created_at: DateTime<Utc>,
    primary_assessment: String,
    confidence: f64,
}

pub struct FollowUpEngine {
    db: SqlitePool,
    orchestrator: std::sync::Arc<LlmOrchestrator>,
    tiers: std::sync::Arc<TierResolver>,
}

impl FollowUpEngine {
    pub fn new(db: SqlitePool, orchestrator: std::sync::Arc<LlmOrchestrator>, tiers: std::sync::Arc<TierResolver>) -> Self {
        Self { db, orchestrator, tiers }
    }

    pub async fn questions(
        &self,
        assessment_id: &str,
        assessment_type: &str,
        user_id: Option<&str>,
    ) -> AppResult<FollowUpQuestionsResponse> {
        let original = self.load_original_assessment(assessment_type, assessment_id).await?;
        let previous = self.chain_history(assessment_type, assessment_id).await?;

        let days_since_original = (Utc::now() - original.created_at).num_days();
        let days_since_last = previous.last().map(|f| (Utc::now() - f.created_at).num_days());
        let has_active_tracking = match user_id {
            Some(id) => self.has_active_tracking(id).await?,
            None => false,
        };

        let prompt = build_questions_prompt(&original, &previous, days_since_original, days_since_last, has_active_tracking);
        let tier = match user_id {
            Some(id) => self.tiers.tier(id).await,
            None => Tier::Free,
        };
        let messages = vec![json!({"role": "system", "content": prompt})];
        let ai_questions = match self.orchestrator.call_with_fallback(&messages, tier, Endpoint::Chat, false, 0.5, 600).await {
            Ok(result) => result
                .parsed_content
                .as_ref()
                .and_then(|v| v["questions"].as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
                .unwrap_or_else(fallback_ai_questions),
            Err(_) => fallback_ai_questions(),
        };

        Ok(FollowUpQuestionsResponse {
            base_questions: BASE_QUESTIONS.iter().map(|s| s.to_string()).collect(),
            ai_questions,
            days_since_original,
            days_since_last,
            has_active_tracking,
        })
    }

    pub async fn submit(&self, request: SubmitFollowUpRequest) -> AppResult<SubmitFollowUpResponse> {
        if Uuid::parse_str(&request.assessment_id).is_err() {
            return Err(AppError::validation("assessment_id must be a valid UUID"));
        }
        if !has_at_least_one_response(&request.responses) {
            return Err(AppError::validation("at least one response is required"));
        }

        let chain_id = self.resolve_chain_id(&request.assessment_type, &request.assessment_id, request.chain_id.as_deref()).await?;
        let original = self.load_original_assessment(&request.assessment_type, &request.assessment_id).await?;
        let previous = self.chain_history(&request.assessment_type, &request.assessment_id).await?;
        let follow_up_number = previous.len() as i32 + 1;

        let tier = match &request.user_id {
            Some(id) => self.tiers.tier(id).await,
            None => Tier::Free,
        };

        self.log_event(&chain_id, "follow_up_started", &json!({"assessment_id": request.assessment_id})).await?;

        let translated_visit = if let Some(visit) = &request.medical_visit {
            if let Some(assessment_text) = &visit.assessment {
                Some(self.translate_jargon(assessment_text, tier).await?)
            } else {
                None
            }
        } else {
            None
        };

        let analysis_prompt = build_analysis_prompt(&original, &previous, &request.responses, translated_visit.as_deref());
        let messages = vec![json!({"role": "system", "content": analysis_prompt})];
        let result = self
            .orchestrator
            .call_with_fallback(&messages, tier, Endpoint::Chat, true, 0.3, 3000)
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        let analysis = parse_follow_up_analysis(result.parsed_content.unwrap_or_else(fallback_analysis_json), &original);
        let confidence_change = analysis.confidence - original.confidence;

        let mut milestones = Vec::new();
        if original.confidence < 90.0 && analysis.confidence >= 90.0 {
            milestones.push("confidence_milestone".to_string());
            self.log_event(&chain_id, "confidence_milestone", &json!({"confidence": analysis.confidence})).await?;
        }
        if !analysis.primary_assessment.is_empty() && analysis.primary_assessment != original.primary_assessment {
            milestones.push("diagnosis_changed".to_string());
            self.log_event(
                &chain_id,
                "diagnosis_changed",
                &json!({"from": original.primary_assessment, "to": analysis.primary_assessment}),
            )
            .await?;
        }
        if !analysis.pattern_insights.discovered_patterns.is_empty() {
            milestones.push("pattern_discovered".to_string());
            self.log_event(&chain_id, "pattern_discovered", &json!({"patterns": analysis.pattern_insights.discovered_patterns}))
                .await?;
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let days_since_original = (now - original.created_at).num_days() as i32;

        sqlx::query(
            "INSERT INTO assessment_follow_ups
             (id, chain_id, parent_follow_up_id, source_type, source_id, follow_up_number,
              base_responses_json, ai_questions_json, analysis_result_json, primary_assessment,
              confidence_score, confidence_change, assessment_evolution_json, days_since_original, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&chain_id)
        .bind(previous.last().map(|f| f.id.clone()))
        .bind(&request.assessment_type)
        .bind(&request.assessment_id)
        .bind(follow_up_number)
        .bind(request.responses.to_string())
        .bind("[]")
        .bind(serde_json::to_string(&analysis).unwrap_or_default())
        .bind(&analysis.primary_assessment)
        .bind(analysis.confidence)
        .bind(confidence_change)
        .bind(serde_json::to_string(&analysis.assessment_evolution).unwrap_or_default())
        .bind(days_since_original)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.log_event(&chain_id, "follow_up_completed", &json!({"follow_up_id": id, "follow_up_number": follow_up_number})).await?;

        Ok(SubmitFollowUpResponse { follow_up_id: id, chain_id, follow_up_number, analysis, confidence_change, milestones })
    }

    pub async fn explain_medical_visit(&self, user_id: Option<&str>, text: &str) -> AppResult<ExplainMedicalVisitResponse> {
        let tier = match user_id {
            Some(id) => self.tiers.tier(id).await,
            None => Tier::Free,
        };
        Ok(ExplainMedicalVisitResponse { plain_language: self.translate_jargon(text, tier).await? })
    }

    pub async fn chain(&self, chain_id: &str) -> AppResult<(Vec<AssessmentFollowUp>, Vec<FollowUpEvent>)> {
        let follow_ups: Vec<AssessmentFollowUp> =
            sqlx::query_as("SELECT * FROM assessment_follow_ups WHERE chain_id = ? ORDER BY follow_up_number ASC")
                .bind(chain_id)
                .fetch_all(&self.db)
                .await?;
        let events: Vec<FollowUpEvent> = sqlx::query_as("SELECT * FROM follow_up_events WHERE chain_id = ? ORDER BY created_at ASC")
            .bind(chain_id)
            .fetch_all(&self.db)
            .await?;
        Ok((follow_ups, events))
    }

    async fn translate_jargon(&self, text: &str, tier: Tier) -> AppResult<String> {
        let prompt = format!(
            "Translate this doctor's note into plain language a patient without medical training \
             can understand, preserving all clinically relevant facts: \"{text}\". Respond as JSON \
             with key plain_language."
        );
        let messages = vec![json!({"role": "system", "content": prompt})];
        let result = self
            .orchestrator
            .call_with_fallback(&messages, tier, Endpoint::Chat, false, 0.3, 800)
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;
        Ok(result
            .parsed_content
            .as_ref()
            .and_then(|v| v["plain_language"].as_str())
            .map(|s| s.to_string())
            .unwrap_or(result.content))
    }

    async fn resolve_chain_id(&self, source_type: &str, source_id: &str, supplied: Option<&str>) -> AppResult<String> {
        if let Some(existing) = self.chain_history(source_type, source_id).await?.first() {
            return Ok(existing.chain_id.clone());
        }
        match supplied {
            Some(id) if Uuid::parse_str(id).is_ok() => Ok(id.to_string()),
            _ => Ok(Uuid::new_v4().to_string()),
        }
    }

    async fn chain_history(&self, source_type: &str, source_id: &str) -> AppResult<Vec<AssessmentFollowUp>> {
        Ok(sqlx::query_as(
            "SELECT * FROM assessment_follow_ups WHERE source_type = ? AND source_id = ? ORDER BY follow_up_number ASC",
        )
        .bind(source_type)
        .bind(source_id)
        .fetch_all(&self.db)
        .await?)
    }

    async fn has_active_tracking(&self, user_id: &str) -> AppResult<bool> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracking_configurations WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;
        Ok(row.0 > 0)
    }

    async fn load_original_assessment(&self, assessment_type: &str, assessment_id: &str) -> AppResult<OriginalAssessment> {
        match assessment_type {
            "quick_scan" => {
                let row: Option<(DateTime<Utc>, String, f64)> =
                    sqlx::query_as("SELECT created_at, analysis_result_json, confidence_score FROM quick_scans WHERE id = ?")
                        .bind(assessment_id)
                        .fetch_optional(&self.db)
                        .await?;
                let (created_at, analysis_json, confidence) = row.ok_or_else(|| AppError::not_found("original quick scan not found"))?;
                let analysis: Value = serde_json::from_str(&analysis_json).unwrap_or(Value::Null);
                let primary_assessment = analysis["what_this_means"].as_str().unwrap_or("unspecified condition").to_string();
                Ok(OriginalAssessment { created_at, primary_assessment, confidence })
            }
            "deep_dive" => {
                let row: Option<(DateTime<Utc>, Option<String>, Option<f64>)> = sqlx::query_as(
                    "SELECT created_at, final_analysis_json, final_confidence FROM deep_dive_sessions WHERE id = ?",
                )
                .bind(assessment_id)
                .fetch_optional(&self.db)
                .await?;
                let (created_at, analysis_json, confidence) = row.ok_or_else(|| AppError::not_found("original deep dive not found"))?;
                let analysis: Value = analysis_json.as_deref().and_then(|s| serde_json::from_str(s).ok()).unwrap_or(Value::Null);
                let primary_assessment = analysis["primary_assessment"].as_str().unwrap_or("unspecified condition").to_string();
                Ok(OriginalAssessment { created_at, primary_assessment, confidence: confidence.unwrap_or(0.0) })
            }
            "photo_analysis" => {
                let row: Option<(DateTime<Utc>, String, f64)> =
                    sqlx::query_as("SELECT created_at, analysis_data_json, confidence_score FROM photo_analyses WHERE id = ?")
                        .bind(assessment_id)
                        .fetch_optional(&self.db)
                        .await?;
                let (created_at, analysis_json, confidence) = row.ok_or_else(|| AppError::not_found("original photo analysis not found"))?;
                let analysis: Value = serde_json::from_str(&analysis_json).unwrap_or(Value::Null);
                let primary_assessment = analysis["what_this_means"].as_str().unwrap_or("unspecified condition").to_string();
                Ok(OriginalAssessment { created_at, primary_assessment, confidence })
            }
            other => Err(AppError::validation(format!("unknown assessment_type: {other}"))),
        }
    }

    async fn log_event(&self, chain_id: &str, event_type: &str, event_data: &Value) -> AppResult<()> {
        sqlx::query("INSERT INTO follow_up_events (id, chain_id, event_type, event_data_json, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(chain_id)
            .bind(event_type)
            .bind(event_data.to_string())
            .bind(Utc::now())
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

fn has_at_least_one_response(responses: &Value) -> bool {
    match responses {
        Value::Object(map) => !map.is_empty(),
        Value::Array(arr) => !arr.is_empty(),
        Value::Null => false,
        _ => true,
    }
}

fn build_questions_prompt(
    original: &OriginalAssessment,
    previous: &[AssessmentFollowUp],
    days_since_original: i64,
    days_since_last: Option<i64>,
    has_active_tracking: bool,
) -> String {
    let last_clause = days_since_last.map(|d| format!(" It has been {d} days since the last follow-up.")).unwrap_or_default();
    let tracking_clause = if has_active_tracking { " The user has active symptom tracking for this condition." } else { "" };
    format!(
        "The original assessment was \"{}\" ({} days ago), with {} prior follow-ups.{last_clause}{tracking_clause} \
         Propose 3 follow-up questions specific to this case. Respond as JSON: {{\"questions\": [\"...\", \"...\", \"...\"]}}",
        original.primary_assessment,
        days_since_original,
        previous.len()
    )
}

fn fallback_ai_questions() -> Vec<String> {
    vec![
        "Is there anything else about your condition you'd like to add?".to_string(),
        "How would you rate your overall improvement on a scale of 1-10?".to_string(),
        "Do you have any new concerns since your last check-in?".to_string(),
    ]
}

fn build_analysis_prompt(
    original: &OriginalAssessment,
    previous: &[AssessmentFollowUp],
    responses: &Value,
    translated_visit: Option<&str>,
) -> String {
    let visit_clause = translated_visit.map(|v| format!(" The patient also reported this medical visit: \"{v}\".")).unwrap_or_default();
    format!(
        "Original assessment: \"{}\" (confidence {}). This is follow-up #{} in the chain. \
         Patient responses: {responses}.{visit_clause} Produce a comprehensive follow-up analysis as \
         JSON with keys: assessment{{condition, confidence, severity, progression}}, \
         assessment_evolution{{original_assessment, current_assessment, confidence_change, \
         diagnosis_refined, key_discoveries}}, progression_narrative, \
         pattern_insights{{discovered_patterns, concerning_patterns}}, treatment_efficacy, \
         recommendations{{immediate, this_week, consider, next_follow_up}}, confidence, \
         primary_assessment, urgency.",
        original.primary_assessment,
        original.confidence,
        previous.len() + 1,
    )
}

fn fallback_analysis_json() -> Value {
    json!({})
}

/// Enforces §4.13.1's shape: fields absent from the LLM's response are synthesized
/// rather than left null, most notably `assessment_evolution`.
fn parse_follow_up_analysis(raw: Value, original: &OriginalAssessment) -> FollowUpAnalysis {
    let mut analysis: FollowUpAnalysis = serde_json::from_value(raw.clone()).unwrap_or_default();

    if analysis.confidence == 0.0 {
        analysis.confidence = raw["confidence"].as_f64().unwrap_or(original.confidence);
    }
    if analysis.primary_assessment.is_empty() {
        analysis.primary_assessment =
            raw["primary_assessment"].as_str().unwrap_or(&original.primary_assessment).to_string();
    }
    if analysis.urgency.is_empty() {
        analysis.urgency = "routine".to_string();
    }
    if analysis.assessment_evolution.original_assessment.is_empty()
        && analysis.assessment_evolution.current_assessment.is_empty()
    {
        analysis.assessment_evolution.original_assessment = original.primary_assessment.clone();
        analysis.assessment_evolution.current_assessment = analysis.primary_assessment.clone();
        analysis.assessment_evolution.confidence_change = analysis.confidence - original.confidence;
        analysis.assessment_evolution.diagnosis_refined = false;
    }
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn original() -> OriginalAssessment {
        OriginalAssessment { created_at: Utc::now(), primary_assessment: "tension headache".to_string(), confidence: 60.0 }
    }

    #[test]
    fn has_at_least_one_response_rejects_empty_object() {
        assert!(!has_at_least_one_response(&json!({})));
        assert!(has_at_least_one_response(&json!({"q1": "better"})));
    }

    #[test]
    fn parse_follow_up_analysis_synthesizes_assessment_evolution_when_missing() {
        let analysis = parse_follow_up_analysis(json!({"confidence": 85, "primary_assessment": "migraine"}), &original());
        assert_eq!(analysis.assessment_evolution.original_assessment, "tension headache");
        assert_eq!(analysis.assessment_evolution.current_assessment, "migraine");
        assert!((analysis.assessment_evolution.confidence_change - 25.0).abs() < 0.01);
    }

    #[test]
    fn parse_follow_up_analysis_preserves_explicit_assessment_evolution() {
        let raw = json!({
            "confidence": 85,
            "primary_assessment": "migraine",
            "assessment_evolution": {
                "original_assessment": "custom original",
                "current_assessment": "custom current",
                "confidence_change": 10.0,
                "diagnosis_refined": true,
                "key_discoveries": ["light sensitivity"],
            },
        });
        let analysis = parse_follow_up_analysis(raw, &original());
        assert_eq!(analysis.assessment_evolution.original_assessment, "custom original");
        assert!(analysis.assessment_evolution.diagnosis_refined);
    }

    #[test]
    fn fallback_ai_questions_returns_exactly_three() {
        assert_eq!(fallback_ai_questions().len(), 3);
    }

    #[test]
    fn base_questions_constant_has_exactly_five_entries() {
        assert_eq!(BASE_QUESTIONS.len(), 5);
    }
}
