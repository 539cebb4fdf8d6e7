//! Single-shot symptom scan plus opt-in enhancement tiers (§4.10).

use crate::models::{QuickScan, QuickScanRequest, QuickScanResponse, Tier};
use crate::services::context_manager::ContextManager;
use crate::services::llm_orchestrator::LlmOrchestrator;
use crate::services::model_selector::Endpoint;
use crate::services::tier_resolver::TierResolver;
use crate::utils::{AppError, AppResult};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

pub struct QuickScanEngine {
    db: SqlitePool,
    orchestrator: std::sync::Arc<LlmOrchestrator>,
    tiers: std::sync::Arc<TierResolver>,
    context: std::sync::Arc<ContextManager>,
}

impl QuickScanEngine {
    pub fn new(
        db: SqlitePool,
        orchestrator: std::sync::Arc<LlmOrchestrator>,
        tiers: std::sync::Arc<TierResolver>,
        context: std::sync::Arc<ContextManager>,
    ) -> Self {
        Self { db, orchestrator, tiers, context }
    }

    pub async fn scan(&self, request: QuickScanRequest) -> AppResult<QuickScanResponse> {
        let tier = match &request.user_id {
            Some(id) => self.tiers.tier(id).await,
            None => Tier::Free,
        };

        let mut history = String::new();
        if let Some(user_id) = &request.user_id {
            history = self
                .context
                .aggregate_user_context(user_id, &request.form_data.to_string(), None)
                .await
                .unwrap_or_default();
        }

        let prompt = build_scan_prompt(&request.body_parts, &request.form_data, request.parts_relationship.as_deref(), &history);
        let messages = vec![json!({"role": "system", "content": prompt})];

        let result = self
            .orchestrator
            .call_with_fallback(&messages, tier, Endpoint::QuickScan, false, 0.4, 1200)
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        let analysis = result.parsed_content.unwrap_or_else(|| fallback_analysis(&request.body_parts));
        let confidence = analysis["confidence"].as_f64().unwrap_or(50.0);
        let urgency_level = analysis["urgency_level"].as_str().unwrap_or("medium").to_string();
        let what_this_means = analysis["what_this_means"].as_str().unwrap_or("").to_string();
        let immediate_actions: Vec<String> = analysis["immediate_actions"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
            .unwrap_or_default();
        let follow_up_questions: Vec<String> = analysis["follow_up_questions"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
            .unwrap_or_default();

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO quick_scans
             (id, user_id, body_parts_json, is_multi_part, form_data_json, analysis_result_json,
              confidence_score, urgency_level, follow_up_questions_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.user_id)
        .bind(serde_json::to_string(&request.body_parts).unwrap_or_default())
        .bind(request.body_parts.len() > 1)
        .bind(serde_json::to_string(&request.form_data).unwrap_or_default())
        .bind(serde_json::to_string(&analysis).unwrap_or_default())
        .bind(confidence)
        .bind(&urgency_level)
        .bind(serde_json::to_string(&follow_up_questions).unwrap_or_default())
        .bind(now)
        .execute(&self.db)
        .await?;

        if let Some(symptoms) = analysis.get("symptoms").and_then(|v| v.as_array()) {
            if !symptoms.is_empty() {
                if let Some(user_id) = &request.user_id {
                    self.insert_tracking_suggestion(&id, user_id, &request.body_parts).await?;
                }
            }
        }

        Ok(QuickScanResponse {
            scan_id: id,
            analysis,
            confidence,
            urgency_level,
            what_this_means,
            immediate_actions,
        })
    }

    async fn insert_tracking_suggestion(&self, scan_id: &str, user_id: &str, body_parts: &[String]) -> AppResult<()> {
        let metric_name = format!("{} symptom severity", body_parts.join("/"));
        sqlx::query(
            "INSERT INTO tracking_suggestions
             (id, user_id, source_type, source_id, metric_name, y_axis_label, y_axis_type,
              tracking_type, symptom_keywords_json, suggested_questions_json, ai_reasoning,
              confidence_score, created_at)
             VALUES (?, ?, 'quick_scan', ?, ?, 'Severity (0-10)', 'numeric', 'symptom', '[]', '[]',
                     'Derived from reported symptoms in a quick scan.', 60.0, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(scan_id)
        .bind(&metric_name)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn load_scan(&self, scan_id: &str) -> AppResult<QuickScan> {
        sqlx::query_as("SELECT * FROM quick_scans WHERE id = ?")
            .bind(scan_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("quick scan not found"))
    }

    /// Enhancement tiers attach a new JSON field alongside the original analysis; they
    /// never mutate `analysis_result_json`.
    pub async fn think_harder(&self, scan_id: &str) -> AppResult<Value> {
        self.enhance(scan_id, Endpoint::ThinkHarder, "enhanced_analysis_json", 0.5, 2500).await
    }

    pub async fn o4_mini(&self, scan_id: &str) -> AppResult<Value> {
        let scan = self.load_scan(scan_id).await?;
        let prompt = build_enhancement_prompt(&scan, "Provide a second opinion using a fast, cost-efficient model.");
        let messages = vec![json!({"role": "system", "content": prompt})];
        let result = self
            .orchestrator
            .call(&messages, "openai/gpt-5-mini", Some(Endpoint::QuickScan), false, 0.4, 1200)
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;
        let analysis = result.parsed_content.unwrap_or_else(|| json!({"note": result.content}));
        sqlx::query("UPDATE quick_scans SET enhanced_analysis_json = ? WHERE id = ?")
            .bind(serde_json::to_string(&analysis).unwrap_or_default())
            .bind(scan_id)
            .execute(&self.db)
            .await?;
        Ok(analysis)
    }

    pub async fn ultra_think(&self, scan_id: &str) -> AppResult<Value> {
        self.enhance(scan_id, Endpoint::UltraThink, "ultra_analysis_json", 0.3, 4000).await
    }

    pub async fn ask_more(&self, scan_id: &str) -> AppResult<Vec<String>> {
        let scan = self.load_scan(scan_id).await?;
        let prompt = build_enhancement_prompt(&scan, "Propose 3 follow-up questions that would sharpen this assessment. Respond as JSON: {\"questions\": [\"...\"]}");
        let messages = vec![json!({"role": "system", "content": prompt})];
        let result = self
            .orchestrator
            .call(&messages, "deepseek/deepseek-chat", Some(Endpoint::QuickScan), false, 0.6, 500)
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;
        let questions: Vec<String> = result
            .parsed_content
            .as_ref()
            .and_then(|v| v["questions"].as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect())
            .unwrap_or_default();
        Ok(questions)
    }

    async fn enhance(&self, scan_id: &str, endpoint: Endpoint, column: &str, temperature: f64, max_tokens: u32) -> AppResult<Value> {
        let scan = self.load_scan(scan_id).await?;
        let tier = match &scan.user_id {
            Some(id) => self.tiers.tier(id).await,
            None => Tier::Free,
        };
        let prompt = build_enhancement_prompt(&scan, "Re-examine this assessment with deeper reasoning, noting anything the original analysis may have missed.");
        let messages = vec![json!({"role": "system", "content": prompt})];
        let result = self
            .orchestrator
            .call_with_fallback(&messages, tier, endpoint, true, temperature, max_tokens)
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;
        let analysis = result.parsed_content.unwrap_or_else(|| json!({"note": result.content}));
        sqlx::query(&format!("UPDATE quick_scans SET {column} = ? WHERE id = ?"))
            .bind(serde_json::to_string(&analysis).unwrap_or_default())
            .bind(scan_id)
            .execute(&self.db)
            .await?;
        Ok(analysis)
    }
}

fn build_scan_prompt(body_parts: &[String], form_data: &Value, parts_relationship: Option<&str>, history: &str) -> String {
    let relationship = parts_relationship.map(|r| format!(" The reported areas are related: {r}.")) .unwrap_or_default();
    let history_clause = if history.is_empty() { String::new() } else { format!(" Relevant history: {history}.") };
    format!(
        "A patient reports symptoms in: {}.{relationship} Details: {form_data}.{history_clause} \
         Provide a quick assessment as JSON with keys confidence, urgency_level, what_this_means, \
         immediate_actions, follow_up_questions, symptoms.",
        body_parts.join(", ")
    )
}

fn build_enhancement_prompt(scan: &QuickScan, instruction: &str) -> String {
    format!(
        "Original quick-scan analysis: {}. {instruction} Respond as JSON.",
        scan.analysis_result_json
    )
}

fn fallback_analysis(body_parts: &[String]) -> Value {
    json!({
        "confidence": 30.0,
        "urgency_level": "medium",
        "what_this_means": format!("We could not generate a detailed assessment for {}.", body_parts.join(", ")),
        "immediate_actions": ["Consult a healthcare provider if symptoms persist or worsen."],
        "follow_up_questions": [],
        "symptoms": [],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_analysis_includes_body_parts() {
        let analysis = fallback_analysis(&["left knee".to_string()]);
        assert!(analysis["what_this_means"].as_str().unwrap().contains("left knee"));
    }

    #[test]
    fn scan_prompt_includes_relationship_clause_when_present() {
        let prompt = build_scan_prompt(&["knee".into(), "ankle".into()], &json!({}), Some("same leg"), "");
        assert!(prompt.contains("same leg"));
    }

    #[test]
    fn scan_prompt_omits_history_clause_when_absent() {
        let prompt = build_scan_prompt(&["knee".into()], &json!({}), None, "");
        assert!(!prompt.contains("Relevant history"));
    }
}
