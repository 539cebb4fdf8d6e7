//! Symptom-tracking configuration and charting (§4.8). A supporting component: most of
//! its surface is plain CRUD plus light aggregation over `TrackingDataPoint` rows.

use crate::models::{
    ChartResponse, ChartStats, DashboardResponse, SuggestTrackingRequest, TrackingConfiguration, TrackingDataPoint,
    TrackingSuggestion,
};
use crate::utils::AppResult;
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

pub struct TrackingEngine {
    db: SqlitePool,
}

impl TrackingEngine {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn suggest(
        &self,
        source_type: &str,
        source_id: &str,
        user_id: &str,
        metric_name: &str,
        y_axis_label: &str,
        tracking_type: &str,
        symptom_keywords: &[String],
        suggested_questions: &[String],
        ai_reasoning: &str,
        confidence_score: f64,
    ) -> AppResult<TrackingSuggestion> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO tracking_suggestions
             (id, user_id, source_type, source_id, metric_name, y_axis_label, y_axis_type,
              tracking_type, symptom_keywords_json, suggested_questions_json, ai_reasoning,
              confidence_score, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'numeric', ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(source_type)
        .bind(source_id)
        .bind(metric_name)
        .bind(y_axis_label)
        .bind(tracking_type)
        .bind(serde_json::to_string(symptom_keywords).unwrap_or_default())
        .bind(serde_json::to_string(suggested_questions).unwrap_or_default())
        .bind(ai_reasoning)
        .bind(confidence_score)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get_suggestion(&id).await
    }

    /// Derives a suggestion's metric/keywords from whatever assessment produced it.
    /// Unrecognized source types fall back to a generic symptom-severity metric.
    pub async fn suggest_from_source(&self, request: SuggestTrackingRequest) -> AppResult<TrackingSuggestion> {
        let (metric_name, y_axis_label, keywords) = match request.source_type.as_str() {
            "quick_scan" => {
                let row: Option<(String,)> =
                    sqlx::query_as("SELECT body_parts_json FROM quick_scans WHERE id = ?")
                        .bind(&request.source_id)
                        .fetch_optional(&self.db)
                        .await?;
                let parts: Vec<String> = row
                    .and_then(|(json,)| serde_json::from_str(&json).ok())
                    .unwrap_or_default();
                (format!("{} symptom severity", parts.join("/")), "Severity (0-10)".to_string(), parts)
            }
            "deep_dive" => {
                let row: Option<(String,)> =
                    sqlx::query_as("SELECT body_parts_json FROM deep_dive_sessions WHERE id = ?")
                        .bind(&request.source_id)
                        .fetch_optional(&self.db)
                        .await?;
                let parts: Vec<String> = row
                    .and_then(|(json,)| serde_json::from_str(&json).ok())
                    .unwrap_or_default();
                (format!("{} symptom severity", parts.join("/")), "Severity (0-10)".to_string(), parts)
            }
            "photo_analysis" => ("condition progression".to_string(), "Size (mm)".to_string(), Vec::new()),
            other => (format!("{other} metric"), "Value".to_string(), Vec::new()),
        };

        self.suggest(
            &request.source_type,
            &request.source_id,
            &request.user_id,
            &metric_name,
            &y_axis_label,
            "severity",
            &keywords,
            &[],
            "Derived automatically from the originating assessment.",
            55.0,
        )
        .await
    }

    async fn get_suggestion(&self, id: &str) -> AppResult<TrackingSuggestion> {
        sqlx::query_as("SELECT * FROM tracking_suggestions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| crate::utils::AppError::not_found("tracking suggestion not found"))
    }

    pub async fn configure(
        &self,
        suggestion_id: &str,
        metric_name_override: Option<&str>,
        y_axis_label_override: Option<&str>,
        show_on_homepage: bool,
    ) -> AppResult<TrackingConfiguration> {
        let suggestion = self.get_suggestion(suggestion_id).await?;
        let id = Uuid::new_v4().to_string();
        let metric_name = metric_name_override.unwrap_or(&suggestion.metric_name);
        let y_axis_label = y_axis_label_override.unwrap_or(&suggestion.y_axis_label);
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO tracking_configurations
             (id, suggestion_id, user_id, metric_name, y_axis_label, y_axis_type, y_axis_min,
              y_axis_max, tracking_type, show_on_homepage, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(suggestion_id)
        .bind(&suggestion.user_id)
        .bind(metric_name)
        .bind(y_axis_label)
        .bind(&suggestion.y_axis_type)
        .bind(suggestion.y_axis_min)
        .bind(suggestion.y_axis_max)
        .bind(&suggestion.tracking_type)
        .bind(show_on_homepage)
        .bind(now)
        .execute(&self.db)
        .await?;

        sqlx::query("UPDATE tracking_suggestions SET action_taken = 'approved_some', actioned_at = ? WHERE id = ?")
            .bind(now)
            .bind(suggestion_id)
            .execute(&self.db)
            .await?;

        sqlx::query_as("SELECT * FROM tracking_configurations WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.db)
            .await
            .map_err(Into::into)
    }

    pub async fn approve_suggestion(&self, suggestion_id: &str) -> AppResult<TrackingConfiguration> {
        self.configure(suggestion_id, None, None, false).await
    }

    pub async fn add_data_point(
        &self,
        configuration_id: &str,
        user_id: &str,
        value: f64,
        notes: Option<&str>,
    ) -> AppResult<TrackingDataPoint> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO tracking_data_points (id, configuration_id, user_id, value, notes, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(configuration_id)
        .bind(user_id)
        .bind(value)
        .bind(notes)
        .bind(now)
        .execute(&self.db)
        .await?;

        sqlx::query_as("SELECT * FROM tracking_data_points WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.db)
            .await
            .map_err(Into::into)
    }

    /// Recent approved configurations plus unactioned suggestions within 7 days.
    pub async fn dashboard(&self, user_id: &str) -> AppResult<DashboardResponse> {
        let configurations: Vec<TrackingConfiguration> =
            sqlx::query_as("SELECT * FROM tracking_configurations WHERE user_id = ? ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&self.db)
                .await?;

        let cutoff = Utc::now() - chrono::Duration::days(7);
        let pending_suggestions: Vec<TrackingSuggestion> = sqlx::query_as(
            "SELECT * FROM tracking_suggestions
             WHERE user_id = ? AND action_taken IS NULL AND created_at >= ?
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;

        Ok(DashboardResponse { configurations, pending_suggestions })
    }

    pub async fn chart(&self, config_id: &str, days: i64) -> AppResult<ChartResponse> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let points: Vec<TrackingDataPoint> = sqlx::query_as(
            "SELECT * FROM tracking_data_points WHERE configuration_id = ? AND recorded_at >= ? ORDER BY recorded_at ASC",
        )
        .bind(config_id)
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;

        let labels = points.iter().map(|p| p.recorded_at.to_rfc3339()).collect();
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();

        let stats = if values.is_empty() {
            ChartStats { min: 0.0, max: 0.0, avg: 0.0, count: 0 }
        } else {
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            ChartStats { min, max, avg, count: values.len() }
        };

        Ok(ChartResponse { labels, values, stats })
    }

    pub async fn configurations(&self, user_id: &str) -> AppResult<Vec<TrackingConfiguration>> {
        Ok(sqlx::query_as("SELECT * FROM tracking_configurations WHERE user_id = ? ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.db)
            .await?)
    }

    pub async fn data_points(&self, config_id: &str) -> AppResult<Vec<TrackingDataPoint>> {
        Ok(sqlx::query_as("SELECT * FROM tracking_data_points WHERE configuration_id = ? ORDER BY recorded_at ASC")
            .bind(config_id)
            .fetch_all(&self.db)
            .await?)
    }

    pub async fn past_scans(&self, user_id: &str) -> AppResult<Vec<Value>> {
        let rows: Vec<(String, String, f64, String, chrono::DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, body_parts_json, confidence_score, urgency_level, created_at
             FROM quick_scans WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, body_parts_json, confidence_score, urgency_level, created_at)| {
                serde_json::json!({
                    "id": id,
                    "body_parts": serde_json::from_str::<Value>(&body_parts_json).unwrap_or(Value::Null),
                    "confidence_score": confidence_score,
                    "urgency_level": urgency_level,
                    "created_at": created_at,
                })
            })
            .collect())
    }

    pub async fn past_dives(&self, user_id: &str) -> AppResult<Vec<Value>> {
        let rows: Vec<(String, String, String, chrono::DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, body_parts_json, status, created_at
             FROM deep_dive_sessions WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, body_parts_json, status, created_at)| {
                serde_json::json!({
                    "id": id,
                    "body_parts": serde_json::from_str::<Value>(&body_parts_json).unwrap_or(Value::Null),
                    "status": status,
                    "created_at": created_at,
                })
            })
            .collect())
    }
}
