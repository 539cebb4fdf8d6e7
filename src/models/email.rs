//! EmailQueueItem / EmailEvent (§3, §4.12).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Queued,
    Sending,
    Sent,
    Delivered,
    Bounced,
    Failed,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Bounced => "bounced",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sending" => Self::Sending,
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "bounced" => Self::Bounced,
            "failed" => Self::Failed,
            _ => Self::Queued,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct EmailQueueItem {
    pub id: String,
    pub user_id: String,
    pub recipient: String,
    pub cc_json: String,
    pub email_type: String,
    pub subject: String,
    pub template: String,
    pub template_data_json: String,
    pub attachment_metadata_json: Option<String>,
    pub attachment_content: Option<String>,
    pub idempotency_key: String,
    pub status: String,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl EmailQueueItem {
    pub fn status_enum(&self) -> EmailStatus {
        EmailStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EmailEvent {
    pub id: String,
    pub aggregate_id: String,
    pub user_id: String,
    pub event_type: String,
    pub event_data_json: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendReportRequest {
    pub user_id: String,
    pub recipient: String,
    #[serde(default)]
    pub cc: Vec<String>,
    pub scan_id: String,
    pub subject: String,
    #[serde(default)]
    pub attachment_base64: Option<String>,
    #[serde(default)]
    pub attachment_content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendReportResponse {
    pub success: bool,
    pub message_id: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendScanRequest {
    pub user_id: String,
    pub recipient: String,
    pub scan_id: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendScanResponse {
    pub success: bool,
    pub message_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendgridWebhookEvent {
    pub sg_message_id: String,
    pub event: String,
    pub email: String,
    pub timestamp: i64,
}
