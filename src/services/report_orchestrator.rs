//! Report classification and generation across the patient-facing and specialist
//! report surfaces (§4.14).
//!
//! `analyze()` classifies intent and parks a `ReportAnalysis`; the `generate_*` family
//! all funnel through `generate()`, which differs only by report type / specialty, the
//! prompt it builds, and the data it is allowed to touch.

use crate::models::{
    AnalyzeReportRequest, AnalyzeReportResponse, DataGatheringScope, DoctorNotesRequest, GenerateReportRequest,
    GenerateReportResponse, RateReportRequest, RateReportResponse, Report, ReportAnalysis, ShareReportRequest,
    ShareReportResponse, Tier, TimeRange,
};
use crate::services::llm_orchestrator::LlmOrchestrator;
use crate::services::model_selector::Endpoint;
use crate::services::tier_resolver::TierResolver;
use crate::utils::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

/// The 15 specialty report types of §4.14; distinct from the 6 general-purpose types.
const SPECIALTIES: [&str; 15] = [
    "cardiology",
    "neurology",
    "psychiatry",
    "dermatology",
    "gastroenterology",
    "endocrinology",
    "pulmonology",
    "primary_care",
    "orthopedics",
    "rheumatology",
    "nephrology",
    "urology",
    "gynecology",
    "oncology",
    "physical_therapy",
];

pub struct ReportOrchestrator {
    db: SqlitePool,
    orchestrator: std::sync::Arc<LlmOrchestrator>,
    tiers: std::sync::Arc<TierResolver>,
}

impl ReportOrchestrator {
    pub fn new(db: SqlitePool, orchestrator: std::sync::Arc<LlmOrchestrator>, tiers: std::sync::Arc<TierResolver>) -> Self {
        Self { db, orchestrator, tiers }
    }

    pub async fn analyze(&self, request: AnalyzeReportRequest) -> AppResult<AnalyzeReportResponse> {
        let photo_session_count = self.photo_session_count(&request.user_id).await?;
        let recommended_type = classify(&request, photo_session_count);
        let time_range = default_time_range(&recommended_type);

        let id = Uuid::new_v4().to_string();
        let report_config = json!({
            "purpose": request.purpose,
            "audience": request.audience,
            "symptom_focus": request.symptom_focus,
            "context": request.context,
            "time_range": time_range,
        });

        sqlx::query(
            "INSERT INTO report_analyses (id, user_id, recommended_type, report_config_json, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&request.user_id)
        .bind(&recommended_type)
        .bind(report_config.to_string())
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(AnalyzeReportResponse {
            analysis_id: id,
            recommended_endpoint: format!("/api/reports/generate_{recommended_type}"),
            recommended_type,
            time_range,
        })
    }

    pub async fn generate(&self, report_type: &str, request: GenerateReportRequest) -> AppResult<GenerateReportResponse> {
        let specialty = SPECIALTIES.iter().find(|s| **s == report_type).map(|s| s.to_string());
        let analysis = self.load_or_create_analysis(&request, report_type).await?;
        let tier = self.tiers.tier(&request.user_id).await;

        let gathered = self.gather(&request.user_id, &request.scope).await?;
        let prompt = build_prompt(report_type, specialty.as_deref(), &gathered);

        let messages = vec![json!({"role": "system", "content": prompt})];
        let result = self
            .orchestrator
            .call_with_fallback(&messages, tier, Endpoint::Reports, true, 0.3, 4000)
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        let report_data = result.parsed_content.clone().unwrap_or_else(|| fallback_report_data(&result.content));
        let executive_summary = report_data["executive_summary"].as_str().unwrap_or_default().to_string();
        let confidence_score = report_data["confidence_score"].as_f64().unwrap_or(70.0);

        let report_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO reports
             (id, user_id, analysis_id, report_type, specialty, report_data_json, executive_summary,
              confidence_score, model_used, time_range_json, doctor_reviewed, rating_sum, rating_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, ?)",
        )
        .bind(&report_id)
        .bind(&request.user_id)
        .bind(&analysis.id)
        .bind(report_type)
        .bind(&specialty)
        .bind(report_data.to_string())
        .bind(&executive_summary)
        .bind(confidence_score)
        .bind(&result.model)
        .bind(request.scope.time_range.as_ref().map(|r| serde_json::to_string(r).unwrap_or_default()))
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(GenerateReportResponse { report_id, report_data })
    }

    pub async fn generate_comprehensive(&self, request: GenerateReportRequest) -> AppResult<GenerateReportResponse> {
        self.generate("comprehensive", request).await
    }
    pub async fn generate_symptom_timeline(&self, request: GenerateReportRequest) -> AppResult<GenerateReportResponse> {
        self.generate("symptom_timeline", request).await
    }
    pub async fn generate_photo_progression(&self, request: GenerateReportRequest) -> AppResult<GenerateReportResponse> {
        self.generate("photo_progression", request).await
    }
    pub async fn generate_30_day(&self, request: GenerateReportRequest) -> AppResult<GenerateReportResponse> {
        self.generate("30_day", request).await
    }
    pub async fn generate_annual(&self, request: GenerateReportRequest) -> AppResult<GenerateReportResponse> {
        self.generate("annual", request).await
    }
    pub async fn generate_annual_summary(&self, request: GenerateReportRequest) -> AppResult<GenerateReportResponse> {
        self.generate("annual_summary", request).await
    }
    pub async fn generate_specialty(&self, specialty: &str, request: GenerateReportRequest) -> AppResult<GenerateReportResponse> {
        if !SPECIALTIES.contains(&specialty) {
            return Err(AppError::validation(format!("unknown specialty: {specialty}")));
        }
        self.generate(specialty, request).await
    }

    pub async fn get(&self, report_id: &str) -> AppResult<Report> {
        sqlx::query_as("SELECT * FROM reports WHERE id = ?")
            .bind(report_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("report not found"))
    }

    pub async fn list(&self, user_id: &str) -> AppResult<Vec<Report>> {
        Ok(sqlx::query_as("SELECT * FROM reports WHERE user_id = ? ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.db)
            .await?)
    }

    pub async fn doctor_notes(&self, report_id: &str, request: DoctorNotesRequest) -> AppResult<Report> {
        let payload = json!({"notes": request.notes, "reviewer": request.reviewer, "reviewed_at": Utc::now()});
        sqlx::query("UPDATE reports SET doctor_reviewed = 1, doctor_notes_json = ? WHERE id = ?")
            .bind(payload.to_string())
            .bind(report_id)
            .execute(&self.db)
            .await?;
        self.get(report_id).await
    }

    pub async fn share(&self, report_id: &str, request: ShareReportRequest) -> AppResult<ShareReportResponse> {
        let _ = self.get(report_id).await?;
        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + Duration::hours(request.ttl_hours);
        sqlx::query("UPDATE reports SET share_token = ?, share_expires_at = ? WHERE id = ?")
            .bind(&token)
            .bind(expires_at)
            .bind(report_id)
            .execute(&self.db)
            .await?;
        Ok(ShareReportResponse { share_token: token, expires_at })
    }

    pub async fn rate(&self, report_id: &str, request: RateReportRequest) -> AppResult<RateReportResponse> {
        if !(1..=5).contains(&request.rating) {
            return Err(AppError::validation("rating must be between 1 and 5"));
        }
        sqlx::query("UPDATE reports SET rating_sum = rating_sum + ?, rating_count = rating_count + 1 WHERE id = ?")
            .bind(request.rating)
            .bind(report_id)
            .execute(&self.db)
            .await?;
        let report = self.get(report_id).await?;
        Ok(RateReportResponse { average_rating: report.average_rating().unwrap_or(0.0), rating_count: report.rating_count })
    }

    async fn load_or_create_analysis(&self, request: &GenerateReportRequest, report_type: &str) -> AppResult<ReportAnalysis> {
        if let Some(id) = &request.analysis_id {
            let existing: Option<ReportAnalysis> =
                sqlx::query_as("SELECT * FROM report_analyses WHERE id = ?").bind(id).fetch_optional(&self.db).await?;
            if let Some(existing) = existing {
                return Ok(existing);
            }
            sqlx::query(
                "INSERT INTO report_analyses (id, user_id, recommended_type, report_config_json, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(&request.user_id)
            .bind(report_type)
            .bind("{}")
            .bind(Utc::now())
            .execute(&self.db)
            .await?;
            return Ok(ReportAnalysis {
                id: id.clone(),
                user_id: request.user_id.clone(),
                recommended_type: report_type.to_string(),
                report_config_json: "{}".to_string(),
                quick_scan_ids_json: None,
                deep_dive_ids_json: None,
                photo_session_ids_json: None,
                general_assessment_ids_json: None,
                general_deep_dive_ids_json: None,
                created_at: Utc::now(),
            });
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO report_analyses (id, user_id, recommended_type, report_config_json, created_at)
             VALUES (?, ?, ?, '{}', ?)",
        )
        .bind(&id)
        .bind(&request.user_id)
        .bind(report_type)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        Ok(ReportAnalysis {
            id,
            user_id: request.user_id.clone(),
            recommended_type: report_type.to_string(),
            report_config_json: "{}".to_string(),
            quick_scan_ids_json: None,
            deep_dive_ids_json: None,
            photo_session_ids_json: None,
            general_assessment_ids_json: None,
            general_deep_dive_ids_json: None,
            created_at: Utc::now(),
        })
    }

    async fn photo_session_count(&self, user_id: &str) -> AppResult<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM photo_sessions WHERE user_id = ?").bind(user_id).fetch_one(&self.db).await?;
        Ok(row.0)
    }

    /// Never substitutes "load all" when any id list in `scope` is present (§4.14).
    async fn gather(&self, user_id: &str, scope: &DataGatheringScope) -> AppResult<Value> {
        if scope.is_selected_mode() {
            let quick_scans = match &scope.quick_scan_ids {
                Some(ids) if !ids.is_empty() => self.quick_scans_by_ids(ids).await?,
                _ => vec![],
            };
            let deep_dives = match &scope.deep_dive_ids {
                Some(ids) if !ids.is_empty() => self.deep_dives_by_ids(ids).await?,
                _ => vec![],
            };
            let photo_analyses = match &scope.photo_session_ids {
                Some(ids) if !ids.is_empty() => self.photo_analyses_by_sessions(ids).await?,
                _ => vec![],
            };
            return Ok(json!({
                "mode": "selected",
                "quick_scans": quick_scans,
                "deep_dives": deep_dives,
                "tracking": Vec::<Value>::new(),
                "conversations": Vec::<Value>::new(),
                "photo_analyses": photo_analyses,
            }));
        }

        let range = scope.time_range.clone().unwrap_or_else(|| default_time_range("comprehensive"));
        Ok(json!({
            "mode": "comprehensive",
            "time_range": range,
            "quick_scans": self.quick_scans_in_range(user_id, &range).await?,
            "deep_dives": self.deep_dives_in_range(user_id, &range).await?,
            "tracking": self.tracking_in_range(user_id, &range).await?,
            "conversations": self.conversations_in_range(user_id, &range).await?,
            "photo_analyses": self.photo_analyses_in_range(user_id, &range).await?,
        }))
    }

    async fn quick_scans_by_ids(&self, ids: &[String]) -> AppResult<Vec<Value>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT body_parts_json, analysis_result_json, confidence_score, urgency_level, created_at FROM quick_scans WHERE id IN (",
        );
        push_id_list(&mut qb, ids);
        qb.push(")");
        let rows: Vec<(String, String, f64, String, DateTime<Utc>)> = qb.build_query_as().fetch_all(&self.db).await?;
        Ok(rows
            .into_iter()
            .map(|(body_parts, analysis, confidence, urgency, created_at)| {
                json!({"kind": "quick_scan", "body_parts": parse_json(&body_parts), "analysis": parse_json(&analysis), "confidence": confidence, "urgency": urgency, "created_at": created_at})
            })
            .collect())
    }

    async fn quick_scans_in_range(&self, user_id: &str, range: &TimeRange) -> AppResult<Vec<Value>> {
        let rows: Vec<(String, String, f64, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT body_parts_json, analysis_result_json, confidence_score, urgency_level, created_at
             FROM quick_scans WHERE user_id = ? AND created_at BETWEEN ? AND ?",
        )
        .bind(user_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(body_parts, analysis, confidence, urgency, created_at)| {
                json!({"kind": "quick_scan", "body_parts": parse_json(&body_parts), "analysis": parse_json(&analysis), "confidence": confidence, "urgency": urgency, "created_at": created_at})
            })
            .collect())
    }

    async fn deep_dives_by_ids(&self, ids: &[String]) -> AppResult<Vec<Value>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT body_parts_json, final_analysis_json, final_confidence, status, created_at FROM deep_dive_sessions WHERE id IN (",
        );
        push_id_list(&mut qb, ids);
        qb.push(")");
        let rows: Vec<(String, Option<String>, Option<f64>, String, DateTime<Utc>)> =
            qb.build_query_as().fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(deep_dive_row_to_json).collect())
    }

    async fn deep_dives_in_range(&self, user_id: &str, range: &TimeRange) -> AppResult<Vec<Value>> {
        let rows: Vec<(String, Option<String>, Option<f64>, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT body_parts_json, final_analysis_json, final_confidence, status, created_at
             FROM deep_dive_sessions WHERE user_id = ? AND created_at BETWEEN ? AND ?",
        )
        .bind(user_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(deep_dive_row_to_json).collect())
    }

    async fn tracking_in_range(&self, user_id: &str, range: &TimeRange) -> AppResult<Vec<Value>> {
        let configs: Vec<(String, String, String)> =
            sqlx::query_as("SELECT id, metric_name, y_axis_label FROM tracking_configurations WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.db)
                .await?;

        let mut out = Vec::with_capacity(configs.len());
        for (config_id, metric_name, y_axis_label) in configs {
            let points: Vec<(f64, Option<String>, DateTime<Utc>)> = sqlx::query_as(
                "SELECT value, notes, recorded_at FROM tracking_data_points
                 WHERE configuration_id = ? AND recorded_at BETWEEN ? AND ? ORDER BY recorded_at ASC",
            )
            .bind(&config_id)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(&self.db)
            .await?;
            if points.is_empty() {
                continue;
            }
            out.push(json!({
                "kind": "tracking",
                "metric_name": metric_name,
                "y_axis_label": y_axis_label,
                "data_points": points.into_iter().map(|(value, notes, at)| json!({"value": value, "notes": notes, "recorded_at": at})).collect::<Vec<_>>(),
            }));
        }
        Ok(out)
    }

    async fn conversations_in_range(&self, user_id: &str, range: &TimeRange) -> AppResult<Vec<Value>> {
        let conversations: Vec<(String, String)> =
            sqlx::query_as("SELECT id, title FROM conversations WHERE user_id = ? AND last_message_at BETWEEN ? AND ?")
                .bind(user_id)
                .bind(range.start)
                .bind(range.end)
                .fetch_all(&self.db)
                .await?;

        let mut out = Vec::with_capacity(conversations.len());
        for (conversation_id, title) in conversations {
            let messages: Vec<(String, String)> =
                sqlx::query_as("SELECT role, content FROM messages WHERE conversation_id = ? ORDER BY created_at ASC")
                    .bind(&conversation_id)
                    .fetch_all(&self.db)
                    .await?;
            out.push(json!({
                "kind": "conversation",
                "title": title,
                "messages": messages.into_iter().map(|(role, content)| json!({"role": role, "content": content})).collect::<Vec<_>>(),
            }));
        }
        Ok(out)
    }

    async fn photo_analyses_by_sessions(&self, session_ids: &[String]) -> AppResult<Vec<Value>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT analysis_data_json, confidence_score, comparison_json, created_at FROM photo_analyses WHERE session_id IN (",
        );
        push_id_list(&mut qb, session_ids);
        qb.push(")");
        let rows: Vec<(String, f64, Option<String>, DateTime<Utc>)> = qb.build_query_as().fetch_all(&self.db).await?;
        Ok(rows.into_iter().map(photo_analysis_row_to_json).collect())
    }

    async fn photo_analyses_in_range(&self, user_id: &str, range: &TimeRange) -> AppResult<Vec<Value>> {
        let rows: Vec<(String, f64, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT pa.analysis_data_json, pa.confidence_score, pa.comparison_json, pa.created_at
             FROM photo_analyses pa JOIN photo_sessions ps ON ps.id = pa.session_id
             WHERE ps.user_id = ? AND pa.created_at BETWEEN ? AND ?",
        )
        .bind(user_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(photo_analysis_row_to_json).collect())
    }
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[String]) {
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
}

fn deep_dive_row_to_json(row: (String, Option<String>, Option<f64>, String, DateTime<Utc>)) -> Value {
    let (body_parts, analysis, confidence, status, created_at) = row;
    json!({
        "kind": "deep_dive",
        "body_parts": parse_json(&body_parts),
        "analysis": analysis.as_deref().map(parse_json).unwrap_or(Value::Null),
        "confidence": confidence,
        "status": status,
        "created_at": created_at,
    })
}

fn photo_analysis_row_to_json(row: (String, f64, Option<String>, DateTime<Utc>)) -> Value {
    let (analysis, confidence, comparison, created_at) = row;
    json!({
        "kind": "photo_analysis",
        "analysis": parse_json(&analysis),
        "confidence": confidence,
        "comparison": comparison.as_deref().map(parse_json).unwrap_or(Value::Null),
        "created_at": created_at,
    })
}

fn parse_json(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or(Value::Null)
}

fn classify(request: &AnalyzeReportRequest, photo_session_count: i64) -> String {
    let emergency = request.context["emergency"].as_bool().unwrap_or(false) || request.purpose.as_deref() == Some("emergency");
    if emergency {
        return "urgent_triage".to_string();
    }
    if request.purpose.as_deref() == Some("annual") {
        return "annual_summary".to_string();
    }
    if photo_session_count >= 3 {
        return "photo_progression".to_string();
    }
    if request.symptom_focus.is_some() {
        return "symptom_timeline".to_string();
    }
    let audience_is_specialist =
        request.audience.as_deref().map(|a| a == "specialist" || SPECIALTIES.contains(&a)).unwrap_or(false);
    if audience_is_specialist {
        return "specialist_focused".to_string();
    }
    "comprehensive".to_string()
}

fn default_time_range(report_type: &str) -> TimeRange {
    let end = Utc::now();
    let days = match report_type {
        "urgent_triage" => 7,
        "symptom_timeline" => 90,
        "specialist_focused" => 90,
        "30_day" => 30,
        "annual" | "annual_summary" => 365,
        "photo_progression" => 180,
        _ => 30,
    };
    TimeRange { start: end - Duration::days(days), end }
}

fn build_prompt(report_type: &str, specialty: Option<&str>, gathered: &Value) -> String {
    let focus = specialty.map(specialty_focus).unwrap_or_else(|| general_focus(report_type));
    format!(
        "Produce a {report_type} medical report from the following patient history: {gathered}. {focus} \
         Respond as JSON with keys: executive_summary, clinical_summary, specialist_focus, \
         recommendations{{immediate, this_week, consider}}, clinical_scales (each with a name, \
         value, and confidence), confidence_score."
    )
}

fn general_focus(report_type: &str) -> &'static str {
    match report_type {
        "symptom_timeline" => "Focus on the chronological evolution of symptoms and any inflection points.",
        "photo_progression" => "Focus on visual/size/color progression across the photo series and any red flags.",
        "30_day" | "annual" | "annual_summary" => "Focus on trends, new conditions, and resolved issues over the period.",
        "urgent_triage" => "Flag any findings that warrant immediate or emergency care, explicitly and first.",
        _ => "Cover presenting concerns, relevant history, and actionable next steps comprehensively.",
    }
}

fn specialty_focus(specialty: &str) -> &'static str {
    match specialty {
        "cardiology" => "Focus on cardiovascular risk factors, chest pain characterization, and rhythm/perfusion concerns.",
        "neurology" => "Focus on headache/seizure/motor-sensory patterns and red-flag neurological signs.",
        "psychiatry" => "Focus on mood, anxiety, sleep, and safety risk factors, phrased for a treating psychiatrist.",
        "dermatology" => "Focus on lesion morphology, distribution, and evolution over time.",
        "gastroenterology" => "Focus on GI symptom patterns, triggers, and alarm features.",
        "endocrinology" => "Focus on metabolic, thyroid, and glycemic patterns across the history.",
        "pulmonology" => "Focus on respiratory symptom triggers, frequency, and severity trends.",
        "primary_care" => "Provide a broad, coordinating summary suitable for a primary care handoff.",
        "orthopedics" => "Focus on musculoskeletal mechanism of injury, functional limitation, and progression.",
        "rheumatology" => "Focus on joint involvement pattern, symmetry, and systemic symptoms.",
        "nephrology" => "Focus on renal function indicators and fluid/electrolyte-relevant history.",
        "urology" => "Focus on urinary and genitourinary symptom patterns.",
        "gynecology" => "Focus on menstrual, reproductive, and pelvic symptom history.",
        "oncology" => "Focus on concerning findings, growth/progression signals, and screening-relevant history.",
        "physical_therapy" => "Focus on functional limitations, range of motion, and rehabilitation progress.",
        _ => "Cover the relevant history comprehensively.",
    }
}

fn fallback_report_data(raw_content: &str) -> Value {
    json!({
        "executive_summary": raw_content,
        "clinical_summary": raw_content,
        "specialist_focus": "",
        "recommendations": {"immediate": [], "this_week": [], "consider": []},
        "clinical_scales": [],
        "confidence_score": 50.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> AnalyzeReportRequest {
        AnalyzeReportRequest { user_id: "u1".into(), purpose: None, audience: None, symptom_focus: None, context: Value::Null }
    }

    #[test]
    fn classify_flags_emergency_context_as_urgent_triage() {
        let mut request = base_request();
        request.context = json!({"emergency": true});
        assert_eq!(classify(&request, 0), "urgent_triage");
    }

    #[test]
    fn classify_prefers_photo_progression_with_enough_sessions() {
        let request = base_request();
        assert_eq!(classify(&request, 3), "photo_progression");
    }

    #[test]
    fn classify_falls_back_to_comprehensive() {
        let request = base_request();
        assert_eq!(classify(&request, 0), "comprehensive");
    }

    #[test]
    fn classify_detects_symptom_focus() {
        let mut request = base_request();
        request.symptom_focus = Some("headaches".into());
        assert_eq!(classify(&request, 0), "symptom_timeline");
    }

    #[test]
    fn classify_detects_specialist_audience() {
        let mut request = base_request();
        request.audience = Some("cardiology".into());
        assert_eq!(classify(&request, 0), "specialist_focused");
    }

    #[test]
    fn default_time_range_scales_with_report_type() {
        let urgent = default_time_range("urgent_triage");
        let annual = default_time_range("annual");
        assert!((annual.end - annual.start) > (urgent.end - urgent.start));
    }

    #[test]
    fn specialty_focus_covers_every_declared_specialty() {
        for specialty in SPECIALTIES {
            assert_ne!(specialty_focus(specialty), "Cover the relevant history comprehensively.");
        }
    }
}
