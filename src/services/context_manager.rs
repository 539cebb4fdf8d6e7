//! Conversation memory management: token-budget status, medically-aware compression,
//! and title generation (§4.7).
//!
//! Grounded line-for-line on `utils/context_compression.py`'s constants and functions,
//! with one documented divergence: `can_continue` is stricter here than the original
//! (see the module doc on `status` below).

use crate::models::{ChatMessage, LLMContextSummary};
use crate::services::llm_orchestrator::LlmOrchestrator;
use crate::services::model_selector::Endpoint;
use crate::services::token_counter;
use crate::models::Tier;
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;

const PREMIUM_TOKEN_LIMIT: usize = 120_000;
const FREE_TOKEN_LIMIT: usize = 30_000;
const FREE_HARD_LIMIT: usize = 100_000;
const AGGRESSIVE_COMPRESSION_LIMIT: usize = 200_000;

const URGENT_KEYWORDS: &[&str] = &[
    "emergency", "urgent", "severe", "critical", "immediate", "hospital", "er", "911",
    "chest pain", "difficulty breathing", "stroke", "heart attack", "bleeding", "unconscious",
    "seizure",
];

const MEDICATION_KEYWORDS: &[&str] = &[
    "medication", "medicine", "drug", "prescription", "dosage", "mg", "ml", "daily", "twice",
    "allergic", "allergy", "side effect", "interaction",
];

const AI_RECOMMENDATION_MARKERS: &[&str] = &[
    "recommend", "suggest", "should", "consider", "diagnosis", "assessment", "likely",
    "appears to be", "treatment", "next steps", "follow up",
];

pub fn has_urgent_keywords(message: &ChatMessage) -> bool {
    let content = message.content.to_lowercase();
    URGENT_KEYWORDS.iter().any(|k| content.contains(k))
}

pub fn has_medication_keywords(message: &ChatMessage) -> bool {
    let content = message.content.to_lowercase();
    MEDICATION_KEYWORDS.iter().any(|k| content.contains(k))
}

pub fn is_ai_recommendation(message: &ChatMessage) -> bool {
    if !message.is_assistant() {
        return false;
    }
    let content = message.content.to_lowercase();
    AI_RECOMMENDATION_MARKERS.iter().any(|m| content.contains(m))
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextStatus {
    pub status: String,
    pub tokens: usize,
    pub limit: usize,
    pub needs_compression: bool,
    pub can_continue: bool,
    pub notice: Option<String>,
    pub upgrade_prompt: Option<serde_json::Value>,
}

fn total_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(|m| token_counter::count(&m.content)).sum()
}

/// The one documented divergence from the original source: the Python always returns
/// `can_continue: true`, relying on the frontend to enforce blocking. This gates
/// free-tier chat outright at the hard limit, matching the stricter behavior this
/// system's error taxonomy (`AppError::Blocked`) requires.
pub fn status(messages: &[ChatMessage], is_premium: bool) -> ContextStatus {
    let tokens = total_tokens(messages);

    if is_premium {
        if tokens < PREMIUM_TOKEN_LIMIT {
            ContextStatus {
                status: "within_limits".into(),
                tokens,
                limit: PREMIUM_TOKEN_LIMIT,
                needs_compression: false,
                can_continue: true,
                notice: None,
                upgrade_prompt: None,
            }
        } else if tokens < AGGRESSIVE_COMPRESSION_LIMIT {
            ContextStatus {
                status: "compressed".into(),
                tokens,
                limit: PREMIUM_TOKEN_LIMIT,
                needs_compression: true,
                can_continue: true,
                notice: Some("Using intelligent compression to maintain conversation quality".into()),
                upgrade_prompt: None,
            }
        } else {
            ContextStatus {
                status: "aggressive_compression".into(),
                tokens,
                limit: PREMIUM_TOKEN_LIMIT,
                needs_compression: true,
                can_continue: true,
                notice: Some(
                    "Using advanced compression. Consider starting a new conversation for best results."
                        .into(),
                ),
                upgrade_prompt: None,
            }
        }
    } else if tokens < FREE_TOKEN_LIMIT {
        ContextStatus {
            status: "within_limits".into(),
            tokens,
            limit: FREE_TOKEN_LIMIT,
            needs_compression: false,
            can_continue: true,
            notice: None,
            upgrade_prompt: None,
        }
    } else if tokens < FREE_HARD_LIMIT {
        ContextStatus {
            status: "limited".into(),
            tokens,
            limit: FREE_TOKEN_LIMIT,
            needs_compression: true,
            can_continue: true,
            notice: None,
            upgrade_prompt: Some(json!({
                "title": "Unlock Full Context Memory",
                "description": "Your conversation history is preserved, but only the last 10 messages are used. Upgrade to Premium for full conversation memory.",
                "benefits": [
                    "Remembers the entire conversation",
                    "Better medical continuity",
                    "Unlimited context length",
                    "Seamless conversation resumption",
                ],
                "cta": "Upgrade to Premium",
            })),
        }
    } else {
        ContextStatus {
            status: "limited".into(),
            tokens,
            limit: FREE_TOKEN_LIMIT,
            needs_compression: true,
            can_continue: false,
            notice: None,
            upgrade_prompt: Some(json!({
                "title": "Unlock Full Context Memory",
                "description": "You've reached the free conversation limit. Upgrade to Premium to continue this conversation.",
                "benefits": [
                    "Remembers the entire conversation",
                    "Better medical continuity",
                    "Unlimited context length",
                ],
                "cta": "Upgrade to Premium",
            })),
        }
    }
}

pub struct ContextManager {
    db: SqlitePool,
}

impl ContextManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// "Premium compression": preserve first 3 + last 10 + any urgent/medication/
    /// AI-recommendation message in between, summarize the rest, dedupe by
    /// (role, first-100-chars), preserving original order.
    pub async fn compress_medical(
        &self,
        messages: &[ChatMessage],
        orchestrator: Option<&LlmOrchestrator>,
    ) -> Vec<ChatMessage> {
        if messages.is_empty() {
            return Vec::new();
        }

        let head_len = messages.len().min(3);
        let mut preserved: Vec<ChatMessage> = messages[..head_len].to_vec();

        let middle_end = messages.len().saturating_sub(10).max(head_len);
        let middle = &messages[head_len..middle_end];

        let mut excluded = Vec::new();
        for msg in middle {
            if has_urgent_keywords(msg) || has_medication_keywords(msg) || is_ai_recommendation(msg) {
                preserved.push(msg.clone());
            } else {
                excluded.push(msg.clone());
            }
        }

        if !excluded.is_empty() {
            let summary = self.summarize(&excluded, 500, orchestrator).await;
            preserved.push(ChatMessage::new("system", format!("[Previous conversation summary: {summary}]")));
        }

        if messages.len() > 10 {
            preserved.extend_from_slice(&messages[messages.len() - 10..]);
        }

        dedup_preserving_order(preserved, messages)
    }

    /// Free-tier context: when more than 15 messages, collapse older ones into one
    /// summary and keep only the last 10.
    pub async fn free_tier_context(
        &self,
        messages: &[ChatMessage],
        orchestrator: Option<&LlmOrchestrator>,
    ) -> Vec<ChatMessage> {
        if messages.len() <= 15 {
            return messages.to_vec();
        }

        let older = &messages[..messages.len() - 10];
        let summary = self.summarize(older, 300, orchestrator).await;

        let mut out = vec![ChatMessage::new("system", format!("Medical history summary: {summary}"))];
        out.extend_from_slice(&messages[messages.len() - 10..]);
        out
    }

    /// Concatenates all stored context summaries for a user; re-summarizes via LLM
    /// when their combined size exceeds 25k tokens, targeting a compression ratio
    /// keyed by how far over budget the raw concatenation is.
    pub async fn aggregate_user_context(
        &self,
        user_id: &str,
        current_query: &str,
        orchestrator: Option<&LlmOrchestrator>,
    ) -> Result<String, sqlx::Error> {
        let summaries: Vec<(String,)> =
            sqlx::query_as("SELECT summary FROM llm_context_summaries WHERE user_id = ? ORDER BY created_at ASC")
                .bind(user_id)
                .fetch_all(&self.db)
                .await?;

        let concatenated = summaries.iter().map(|(s,)| s.as_str()).collect::<Vec<_>>().join("\n\n");
        let tokens = token_counter::count(&concatenated);

        if tokens <= 25_000 {
            return Ok(concatenated);
        }

        let target_tokens = if tokens < 50_000 {
            (tokens as f64 / 1.5) as usize
        } else if tokens < 100_000 {
            tokens / 2
        } else {
            tokens / 5
        };

        let Some(orchestrator) = orchestrator else {
            return Ok(truncate_to_words(&concatenated, target_tokens));
        };

        let prompt = format!(
            "Summarize the following medical history, focusing on what's relevant to: {current_query}\n\n{concatenated}"
        );
        let messages = vec![json!({"role": "system", "content": prompt})];
        match orchestrator
            .call_with_fallback(&messages, Tier::Free, Endpoint::Chat, false, 0.3, target_tokens.max(200) as u32)
            .await
        {
            Ok(result) => Ok(result.content),
            Err(_) => Ok(truncate_to_words(&concatenated, target_tokens)),
        }
    }

    /// A ≤100-char title from the first 6 messages; quotes stripped.
    pub async fn generate_title(
        &self,
        messages: &[ChatMessage],
        orchestrator: Option<&LlmOrchestrator>,
    ) -> String {
        let Some(orchestrator) = orchestrator else {
            return "Health Discussion".to_string();
        };

        let head: Vec<&ChatMessage> = messages.iter().take(6).collect();
        let transcript = head
            .iter()
            .map(|m| format!("{}: {}", m.role, truncate_chars(&m.content, 200)))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Generate a brief, descriptive title (3-7 words) for this medical conversation:\n\n{transcript}\n\nTitle:"
        );
        let chat_messages = vec![json!({"role": "system", "content": prompt})];

        match orchestrator.call_with_fallback(&chat_messages, Tier::Free, Endpoint::Chat, false, 0.5, 20).await {
            Ok(result) => {
                let title = result.content.replace(['"', '\''], "");
                let title = title.trim();
                if title.is_empty() { "Health Discussion".to_string() } else { truncate_chars(title, 100) }
            }
            Err(_) => "Health Discussion".to_string(),
        }
    }

    async fn summarize(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        orchestrator: Option<&LlmOrchestrator>,
    ) -> String {
        let Some(orchestrator) = orchestrator else {
            return fallback_summary(messages);
        };

        let conversation_text = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, truncate_chars(&m.content, 500)))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Summarize this medical conversation focusing on: initial complaint, key medical information, \
             medications mentioned, recommendations given, and any urgent concerns. Keep it under {max_tokens} tokens.\n\n\
             Conversation:\n{}\n\nMedical Summary:",
            truncate_chars(&conversation_text, 3000)
        );
        let chat_messages = vec![json!({"role": "system", "content": prompt})];

        match orchestrator.call_with_fallback(&chat_messages, Tier::Free, Endpoint::Chat, false, 0.3, max_tokens).await {
            Ok(result) if !result.content.is_empty() => result.content,
            _ => fallback_summary(messages),
        }
    }
}

fn fallback_summary(messages: &[ChatMessage]) -> String {
    match messages.last() {
        Some(last) => format!("Summary unavailable. Last message: {}", truncate_chars(&last.content, 200)),
        None => format!("Unable to generate summary. Conversation has {} messages.", messages.len()),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn truncate_to_words(s: &str, target_tokens: usize) -> String {
    let target_words = ((target_tokens as f64) / 1.3).ceil() as usize;
    s.split_whitespace().take(target_words).collect::<Vec<_>>().join(" ")
}

fn dedup_preserving_order(preserved: Vec<ChatMessage>, original: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::new();
    for msg in preserved {
        let key = (msg.role.clone(), truncate_chars(&msg.content, 100));
        if seen.insert(key) {
            deduped.push(msg);
        }
    }

    let index_of = |msg: &ChatMessage| -> i64 {
        original.iter().position(|m| m == msg).map(|i| i as i64).unwrap_or(-1)
    };
    deduped.sort_by_key(index_of);
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> ChatMessage {
        ChatMessage::new(role, content)
    }

    #[test]
    fn free_tier_status_blocks_at_hard_limit() {
        let content = "word ".repeat(77_000); // ~100,100 estimated tokens
        let messages = vec![msg("user", &content)];
        let s = status(&messages, false);
        assert!(!s.can_continue);
        assert_eq!(s.status, "limited");
    }

    #[test]
    fn free_tier_status_allows_below_hard_limit() {
        let messages = vec![msg("user", "hello there")];
        let s = status(&messages, false);
        assert!(s.can_continue);
        assert_eq!(s.status, "within_limits");
    }

    #[test]
    fn premium_status_within_limits() {
        let messages = vec![msg("user", "hello there")];
        let s = status(&messages, true);
        assert!(s.can_continue);
        assert!(!s.needs_compression);
    }

    #[test]
    fn urgent_keyword_detection_is_case_insensitive() {
        assert!(has_urgent_keywords(&msg("user", "I think this is an EMERGENCY")));
        assert!(!has_urgent_keywords(&msg("user", "just a regular checkup")));
    }

    #[test]
    fn ai_recommendation_requires_assistant_role() {
        assert!(is_ai_recommendation(&msg("assistant", "I recommend seeing a doctor")));
        assert!(!is_ai_recommendation(&msg("user", "I recommend seeing a doctor")));
    }

    #[tokio::test]
    async fn compress_medical_preserves_head_tail_and_urgent_middle() {
        let db = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&db).await.unwrap();
        let manager = ContextManager::new(db);

        let mut messages = vec![
            msg("user", "chief complaint one"),
            msg("assistant", "ack one"),
            msg("user", "chief complaint two"),
        ];
        for i in 0..20 {
            messages.push(msg("user", &format!("filler message {i}")));
        }
        messages.push(msg("user", "this is an EMERGENCY situation"));
        for i in 0..10 {
            messages.push(msg("assistant", &format!("tail message {i}")));
        }

        let result = manager.compress_medical(&messages, None).await;

        assert!(result.iter().any(|m| m.content == "chief complaint one"));
        assert!(result.iter().any(|m| m.content.contains("EMERGENCY")));
        assert!(result.iter().any(|m| m.content == "tail message 9"));
    }
}
