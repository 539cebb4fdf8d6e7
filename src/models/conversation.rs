//! Conversation, Message, and LLMContextSummary — the chat memory entities (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub title_locked: bool,
    pub auto_title_generated: bool,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "system" => Self::System,
            "assistant" => Self::Assistant,
            _ => Self::User,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub token_count: i64,
    pub created_at: DateTime<Utc>,
    pub model_used: Option<String>,
}

/// Plain role/content pair used by ContextManager/LLMOrchestrator — decoupled from the
/// persisted `Message` row so compression/salience functions stay pure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

impl From<&Message> for ChatMessage {
    fn from(m: &Message) -> Self {
        Self { role: m.role.clone(), content: m.content.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    ConversationSummary,
    QuickScanSummary,
    DeepDiveSummary,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversationSummary => "conversation_summary",
            Self::QuickScanSummary => "quick_scan_summary",
            Self::DeepDiveSummary => "deep_dive_summary",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LLMContextSummary {
    pub id: String,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub summary: String,
    pub context_type: String,
    pub token_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub message: String,
    pub model_used: String,
    pub conversation_title: String,
    pub context_status: String,
    pub usage: Option<serde_json::Value>,
}
