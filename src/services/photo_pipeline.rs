//! Photo upload categorization/routing, vision analysis, and session lifecycle (§4.11.1,
//! §4.11.2). SmartPhotoBatcher and ProgressionAnalyzer live in their own modules; this
//! file is the thing that calls them and owns persistence.

use crate::db::ObjectStore;
use crate::models::{
    FollowUpSuggestion, PhotoAnalysis, PhotoAnalyzeRequest, PhotoCategory, PhotoReminder, PhotoSession, PhotoUpload,
    ProgressionResult, SmartBatchResult, Tier,
};
use crate::services::model_selector::Endpoint;
use crate::services::progression_analyzer;
use crate::services::smart_batcher;
use crate::services::tier_resolver::TierResolver;
use crate::services::llm_orchestrator::LlmOrchestrator;
use crate::services::tracking_engine::TrackingEngine;
use crate::utils::{AppError, AppResult};
use base64::Engine;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

const MAX_PHOTOS: usize = smart_batcher::DEFAULT_MAX_PHOTOS;
const SENSITIVE_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, serde::Serialize)]
pub struct CategorizationResult {
    pub category: PhotoCategory,
    pub confidence: f64,
    pub subcategory: Option<String>,
    pub quality_score: Option<f64>,
}

/// What happened to an uploaded image, distinct from `PhotoCategory` because two
/// categories (`unclear`, `non_medical`) never produce a persisted, analyzable row.
pub enum UploadOutcome {
    Stored(PhotoUpload),
    RequiresAction(CategorizationResult),
    Ignored(CategorizationResult),
}

pub struct PhotoPipeline {
    db: SqlitePool,
    orchestrator: std::sync::Arc<LlmOrchestrator>,
    tiers: std::sync::Arc<TierResolver>,
    object_store: std::sync::Arc<dyn ObjectStore>,
    tracking: std::sync::Arc<TrackingEngine>,
}

impl PhotoPipeline {
    pub fn new(
        db: SqlitePool,
        orchestrator: std::sync::Arc<LlmOrchestrator>,
        tiers: std::sync::Arc<TierResolver>,
        object_store: std::sync::Arc<dyn ObjectStore>,
        tracking: std::sync::Arc<TrackingEngine>,
    ) -> Self {
        Self { db, orchestrator, tiers, object_store, tracking }
    }

    pub async fn create_session(&self, user_id: &str, condition_name: &str, description: &str) -> AppResult<PhotoSession> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO photo_sessions (id, user_id, condition_name, description, is_sensitive, created_at, last_photo_at)
             VALUES (?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(condition_name)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?;
        self.load_session(&id).await
    }

    pub async fn load_session(&self, session_id: &str) -> AppResult<PhotoSession> {
        sqlx::query_as("SELECT * FROM photo_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("photo session not found"))
    }

    pub async fn categorize(&self, tier: Tier, image_base64: &str, mime_type: &str) -> AppResult<CategorizationResult> {
        let prompt = "Classify this medical photo into exactly one category: medical_normal, \
             medical_sensitive (intimate/private body area), medical_gore (open wound/graphic), \
             unclear (cannot determine), non_medical, or inappropriate (not a medical image, abusive, \
             or otherwise not appropriate to analyze). Respond as JSON with keys category, confidence \
             (0-100), subcategory (nullable), quality_score (0-100).";
        let messages = vec![vision_message(prompt, image_base64, mime_type)];

        let result = self
            .orchestrator
            .call_with_fallback(&messages, tier, Endpoint::PhotoAnalysis, false, 0.2, 400)
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        let parsed = result.parsed_content.unwrap_or_else(|| json!({"category": "unclear", "confidence": 0}));
        Ok(CategorizationResult {
            category: parse_category(parsed["category"].as_str().unwrap_or("unclear")),
            confidence: parsed["confidence"].as_f64().unwrap_or(0.0),
            subcategory: parsed["subcategory"].as_str().map(|s| s.to_string()),
            quality_score: parsed["quality_score"].as_f64(),
        })
    }

    /// Categorizes, then routes per §4.11.1: normal/gore photos go to the object store,
    /// sensitive photos never leave `temporary_data`, unclear/non_medical are never
    /// persisted for analysis, and inappropriate images are rejected outright.
    pub async fn upload(
        &self,
        session_id: &str,
        user_id: &str,
        image_base64: &str,
        mime_type: &str,
        is_followup: bool,
        followup_notes: Option<&str>,
    ) -> AppResult<UploadOutcome> {
        let tier = self.tiers.tier(user_id).await;
        let categorization = self.categorize(tier, image_base64, mime_type).await?;

        if categorization.category == PhotoCategory::Inappropriate {
            return Err(AppError::validation("image rejected: inappropriate content"));
        }
        if categorization.category == PhotoCategory::NonMedical {
            return Ok(UploadOutcome::Ignored(categorization));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let file_metadata = json!({"mime_type": mime_type}).to_string();

        let (storage_url, temporary_data): (Option<String>, Option<String>) = match categorization.category {
            PhotoCategory::MedicalNormal | PhotoCategory::MedicalGore => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(image_base64)
                    .map_err(|e| AppError::validation(format!("invalid base64 image data: {e}")))?;
                let extension = mime_type.split('/').nth(1).unwrap_or("jpg");
                let key = format!("sessions/{session_id}/{id}.{extension}");
                let url = self.object_store.put(&key, &bytes).await.map_err(|e| AppError::Internal(e.to_string()))?;
                (Some(url), None)
            }
            PhotoCategory::MedicalSensitive => {
                sqlx::query("UPDATE photo_sessions SET is_sensitive = 1 WHERE id = ?").bind(session_id).execute(&self.db).await?;
                (None, Some(image_base64.to_string()))
            }
            PhotoCategory::Unclear => (None, None),
            PhotoCategory::NonMedical | PhotoCategory::Inappropriate => unreachable!("handled above"),
        };

        sqlx::query(
            "INSERT INTO photo_uploads
             (id, session_id, category, storage_url, temporary_data, file_metadata_json, is_followup,
              quality_score, followup_notes, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(session_id)
        .bind(categorization.category.as_str())
        .bind(&storage_url)
        .bind(&temporary_data)
        .bind(&file_metadata)
        .bind(is_followup)
        .bind(categorization.quality_score)
        .bind(followup_notes)
        .bind(now)
        .execute(&self.db)
        .await?;

        sqlx::query("UPDATE photo_sessions SET last_photo_at = ? WHERE id = ?").bind(now).bind(session_id).execute(&self.db).await?;

        if categorization.category == PhotoCategory::Unclear {
            return Ok(UploadOutcome::RequiresAction(categorization));
        }

        let upload = sqlx::query_as("SELECT * FROM photo_uploads WHERE id = ?").bind(&id).fetch_one(&self.db).await?;
        Ok(UploadOutcome::Stored(upload))
    }

    pub async fn list_sessions(&self, user_id: &str) -> AppResult<Vec<PhotoSession>> {
        Ok(sqlx::query_as("SELECT * FROM photo_sessions WHERE user_id = ? ORDER BY last_photo_at DESC")
            .bind(user_id)
            .fetch_all(&self.db)
            .await?)
    }

    /// Sessions carry no foreign-key cascade; delete children explicitly, uploads last
    /// since they're the only ones holding object-store keys.
    pub async fn delete_session(&self, session_id: &str) -> AppResult<()> {
        let uploads = self.session_photos(session_id).await?;
        for upload in &uploads {
            if let Some(url) = &upload.storage_url {
                let _ = self.object_store.delete(url).await;
            }
        }
        sqlx::query("DELETE FROM photo_analyses WHERE session_id = ?").bind(session_id).execute(&self.db).await?;
        sqlx::query("DELETE FROM photo_reminders WHERE session_id = ?").bind(session_id).execute(&self.db).await?;
        sqlx::query("DELETE FROM photo_uploads WHERE session_id = ?").bind(session_id).execute(&self.db).await?;
        sqlx::query("DELETE FROM photo_sessions WHERE id = ?").bind(session_id).execute(&self.db).await?;
        Ok(())
    }

    pub async fn session_photos(&self, session_id: &str) -> AppResult<Vec<PhotoUpload>> {
        Ok(sqlx::query_as("SELECT * FROM photo_uploads WHERE session_id = ? ORDER BY uploaded_at ASC")
            .bind(session_id)
            .fetch_all(&self.db)
            .await?)
    }

    pub async fn session_analyses(&self, session_id: &str) -> AppResult<Vec<PhotoAnalysis>> {
        Ok(sqlx::query_as("SELECT * FROM photo_analyses WHERE session_id = ? ORDER BY created_at ASC")
            .bind(session_id)
            .fetch_all(&self.db)
            .await?)
    }

    /// Builds the vision prompt per §4.11.2: NEW photos first, then (if comparison photos
    /// are present) the exact separator text, then OLD photos.
    pub async fn analyze(&self, user_id: Option<&str>, request: PhotoAnalyzeRequest) -> AppResult<PhotoAnalysis> {
        let session = self.load_session(&request.session_id).await?;
        let tier = match user_id {
            Some(id) => self.tiers.tier(id).await,
            None => Tier::Free,
        };

        let new_photos = self.load_uploads(&request.session_id, &request.photo_ids).await?;
        let is_sensitive = new_photos.iter().any(|p| p.category == PhotoCategory::MedicalSensitive.as_str());

        let mut content = vec![json!({"type": "text", "text": analysis_instructions(request.context.as_deref())})];
        for photo in &new_photos {
            content.push(photo_content_part(photo, &self.object_store).await?);
        }

        let mut comparison_payload: Option<Value> = None;
        if let Some(comparison_ids) = &request.comparison_photo_ids {
            if !comparison_ids.is_empty() {
                let mut old_photos = self.load_uploads(&request.session_id, comparison_ids).await?;
                if old_photos.len() > MAX_PHOTOS {
                    let analyses = self.session_analyses(&request.session_id).await?;
                    let batch: SmartBatchResult = smart_batcher::select(&old_photos, &analyses, MAX_PHOTOS);
                    old_photos = batch.selected;
                }
                content.push(json!({"type": "text", "text": "--- COMPARED TO PREVIOUS/BASELINE PHOTOS BELOW ---"}));
                for photo in &old_photos {
                    content.push(photo_content_part(photo, &self.object_store).await?);
                }
                comparison_payload = Some(json!({"photo_count": old_photos.len()}));
            }
        }

        let messages = vec![json!({"role": "user", "content": content})];
        let result = self
            .orchestrator
            .call_with_fallback(&messages, tier, Endpoint::PhotoAnalysis, false, 0.3, 3000)
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        let analysis_data = normalize_analysis(result.parsed_content.unwrap_or_else(|| fallback_analysis()));
        let confidence_score = analysis_data["confidence"].as_f64().unwrap_or(50.0);
        let comparison_json = analysis_data
            .get("comparison")
            .cloned()
            .or(comparison_payload)
            .map(|v| v.to_string());

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = request.temporary_analysis.then(|| now + ChronoDuration::hours(SENSITIVE_TTL_HOURS));

        sqlx::query(
            "INSERT INTO photo_analyses
             (id, session_id, photo_ids_json, analysis_data_json, model_used, confidence_score,
              is_sensitive, expires_at, comparison_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.session_id)
        .bind(serde_json::to_string(&request.photo_ids).unwrap_or_default())
        .bind(analysis_data.to_string())
        .bind(&result.model)
        .bind(confidence_score)
        .bind(is_sensitive || session.is_sensitive)
        .bind(expires_at)
        .bind(&comparison_json)
        .bind(now)
        .execute(&self.db)
        .await?;

        if !request.temporary_analysis {
            if let Some(metrics) = analysis_data["trackable_metrics"].as_array() {
                if let Some(user_id) = user_id {
                    for metric in metrics {
                        let metric_name = metric["name"].as_str().unwrap_or("Symptom severity");
                        let y_axis_label = metric["y_axis_label"].as_str().unwrap_or("Severity (0-10)");
                        self.tracking
                            .suggest(
                                "photo_analysis",
                                &id,
                                user_id,
                                metric_name,
                                y_axis_label,
                                "symptom",
                                &[],
                                &[],
                                "Derived from a trackable metric identified in photo analysis.",
                                confidence_score.min(90.0),
                            )
                            .await?;
                    }
                }
            }
        }

        sqlx::query_as("SELECT * FROM photo_analyses WHERE id = ?").bind(&id).fetch_one(&self.db).await.map_err(Into::into)
    }

    pub async fn batch_for_comparison(&self, session_id: &str, max_photos: usize) -> AppResult<SmartBatchResult> {
        let photos = self.session_photos(session_id).await?;
        let analyses = self.session_analyses(session_id).await?;
        Ok(smart_batcher::select(&photos, &analyses, max_photos))
    }

    pub async fn progression(&self, session_id: &str) -> AppResult<ProgressionResult> {
        let analyses = self.session_analyses(session_id).await?;
        let points = progression_analyzer::extract_points(&analyses);
        Ok(progression_analyzer::analyze(&points))
    }

    pub async fn suggest_monitoring(&self, session_id: &str) -> AppResult<FollowUpSuggestion> {
        let session = self.load_session(session_id).await?;
        let analyses = self.session_analyses(session_id).await?;
        let points = progression_analyzer::extract_points(&analyses);
        let last_size_mm = points.iter().rev().find_map(|p| p.size_mm);

        let progression = match progression_analyzer::analyze(&points) {
            ProgressionResult::Analysis(progression) => progression,
            ProgressionResult::InsufficientData { .. } => {
                return Ok(FollowUpSuggestion {
                    interval_days: 7,
                    priority: "routine".to_string(),
                    clinical_note: progression_analyzer::clinical_threshold_note(&session.condition_name, last_size_mm),
                });
            }
        };

        let red_flags_total: u32 = points.iter().map(|p| p.red_flags.len() as u32).sum();
        let ai_interval = analyses
            .last()
            .map(|a| a.analysis_data())
            .and_then(|data| data["next_monitoring"]["optimal_interval_days"].as_f64());
        Ok(progression_analyzer::suggest_follow_up_for_condition(
            &progression,
            red_flags_total,
            "routine",
            ai_interval,
            Some(&session.condition_name),
            last_size_mm,
        ))
    }

    pub async fn configure_reminder(
        &self,
        session_id: &str,
        analysis_id: &str,
        user_id: &str,
        enabled: bool,
        interval_days: i32,
        reminder_method: &str,
        ai_reasoning: &str,
    ) -> AppResult<PhotoReminder> {
        let next_reminder_date = Utc::now() + ChronoDuration::days(interval_days as i64);
        sqlx::query(
            "INSERT INTO photo_reminders
             (session_id, analysis_id, user_id, enabled, interval_days, reminder_method, next_reminder_date, ai_reasoning)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
               analysis_id = excluded.analysis_id, enabled = excluded.enabled, interval_days = excluded.interval_days,
               reminder_method = excluded.reminder_method, next_reminder_date = excluded.next_reminder_date,
               ai_reasoning = excluded.ai_reasoning",
        )
        .bind(session_id)
        .bind(analysis_id)
        .bind(user_id)
        .bind(enabled)
        .bind(interval_days)
        .bind(reminder_method)
        .bind(next_reminder_date)
        .bind(ai_reasoning)
        .execute(&self.db)
        .await?;

        sqlx::query_as("SELECT * FROM photo_reminders WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.db)
            .await
            .map_err(Into::into)
    }

    async fn load_uploads(&self, session_id: &str, photo_ids: &[String]) -> AppResult<Vec<PhotoUpload>> {
        if photo_ids.is_empty() {
            return Ok(vec![]);
        }
        let placeholders = photo_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!("SELECT * FROM photo_uploads WHERE session_id = ? AND id IN ({placeholders}) ORDER BY uploaded_at ASC");
        let mut q = sqlx::query_as::<_, PhotoUpload>(&query).bind(session_id);
        for id in photo_ids {
            q = q.bind(id);
        }
        Ok(q.fetch_all(&self.db).await?)
    }
}

fn vision_message(prompt: &str, image_base64: &str, mime_type: &str) -> Value {
    json!({
        "role": "user",
        "content": [
            {"type": "text", "text": prompt},
            {"type": "image_url", "image_url": {"url": format!("data:{mime_type};base64,{image_base64}")}},
        ],
    })
}

async fn photo_content_part(photo: &PhotoUpload, object_store: &std::sync::Arc<dyn ObjectStore>) -> AppResult<Value> {
    let mime_type = serde_json::from_str::<Value>(&photo.file_metadata_json)
        .ok()
        .and_then(|v| v["mime_type"].as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| "image/jpeg".to_string());

    let url = if let Some(storage_url) = &photo.storage_url {
        object_store.signed_url(storage_url, 3600).await.map_err(|e| AppError::Internal(e.to_string()))?
    } else if let Some(data) = &photo.temporary_data {
        format!("data:{mime_type};base64,{data}")
    } else {
        return Err(AppError::state("photo has neither storage_url nor temporary_data"));
    };

    Ok(json!({"type": "image_url", "image_url": {"url": url}}))
}

fn analysis_instructions(context: Option<&str>) -> String {
    let context_clause = context.map(|c| format!(" The patient describes: \"{c}\".")).unwrap_or_default();
    format!(
        "Analyze these medical photos.{context_clause} Perform question detection on the patient \
         description (direct, implied, comparative, or concern-expressing); if a question is \
         detected, set question_detected=true and answer it in question_answer. Respond as JSON \
         with keys: what_this_means, confidence, red_flags, immediate_actions, trackable_metrics, \
         key_measurements, question_detected, question_answer, next_monitoring."
    )
}

fn normalize_analysis(mut value: Value) -> Value {
    for key in ["red_flags", "immediate_actions", "trackable_metrics"] {
        if !value[key].is_array() {
            value[key] = json!([]);
        }
    }
    for key in ["what_this_means", "question_answer"] {
        if !value[key].is_string() {
            value[key] = json!("");
        }
    }
    if !value["key_measurements"].is_object() {
        value["key_measurements"] = json!({});
    }
    if !value["question_detected"].is_boolean() {
        value["question_detected"] = json!(false);
    }
    value
}

fn fallback_analysis() -> Value {
    json!({
        "what_this_means": "We could not generate a detailed analysis of these photos.",
        "confidence": 30.0,
        "red_flags": [],
        "immediate_actions": ["Consult a healthcare provider if you have concerns."],
        "trackable_metrics": [],
        "key_measurements": {},
        "question_detected": false,
        "question_answer": "",
    })
}

fn parse_category(s: &str) -> PhotoCategory {
    match s {
        "medical_normal" => PhotoCategory::MedicalNormal,
        "medical_sensitive" => PhotoCategory::MedicalSensitive,
        "medical_gore" => PhotoCategory::MedicalGore,
        "non_medical" => PhotoCategory::NonMedical,
        "inappropriate" => PhotoCategory::Inappropriate,
        _ => PhotoCategory::Unclear,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_analysis_fills_in_missing_array_and_string_fields() {
        let normalized = normalize_analysis(json!({"confidence": 80}));
        assert_eq!(normalized["red_flags"], json!([]));
        assert_eq!(normalized["immediate_actions"], json!([]));
        assert_eq!(normalized["what_this_means"], json!(""));
        assert_eq!(normalized["question_detected"], json!(false));
    }

    #[test]
    fn normalize_analysis_preserves_present_values() {
        let normalized = normalize_analysis(json!({"red_flags": ["asymmetric border"], "confidence": 70}));
        assert_eq!(normalized["red_flags"], json!(["asymmetric border"]));
    }

    #[test]
    fn parse_category_defaults_unknown_strings_to_unclear() {
        assert_eq!(parse_category("bogus"), PhotoCategory::Unclear);
        assert_eq!(parse_category("medical_gore"), PhotoCategory::MedicalGore);
    }

    #[test]
    fn fallback_analysis_is_well_formed() {
        let analysis = fallback_analysis();
        assert!(analysis["red_flags"].is_array());
        assert!(analysis["confidence"].as_f64().unwrap() > 0.0);
    }
}
