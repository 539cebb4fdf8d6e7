//! LLMProvider / LLMUsageStats — supplementary admin entities (SPEC_FULL.md §3.1), used
//! by ModelSelector to know which endpoints exist and by the usage-tracking sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct LLMProvider {
    pub id: i64,
    pub name: String,
    pub endpoint: String,
    pub api_key: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Never serialize `api_key` verbatim; only its last four characters leak.
#[derive(Debug, Clone, Serialize)]
pub struct LLMProviderInfo {
    pub id: i64,
    pub name: String,
    pub endpoint: String,
    pub api_key_masked: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<LLMProvider> for LLMProviderInfo {
    fn from(p: LLMProvider) -> Self {
        let masked = mask_key(&p.api_key);
        Self {
            id: p.id,
            name: p.name,
            endpoint: p.endpoint,
            api_key_masked: masked,
            enabled: p.enabled,
            created_at: p.created_at,
        }
    }
}

fn mask_key(key: &str) -> String {
    if key.len() <= 4 {
        "*".repeat(key.len())
    } else {
        format!("{}{}", "*".repeat(key.len() - 4), &key[key.len() - 4..])
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LLMUsageStats {
    pub date: String,
    pub provider_id: i64,
    pub endpoint: String,
    pub request_count: i64,
    pub total_tokens: i64,
    pub error_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProviderRequest {
    pub name: String,
    pub endpoint: String,
    pub api_key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProviderRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}
