//! Tier x endpoint -> model list table (§4.5), loaded from a JSON file at startup if
//! present, else compiled defaults; reloadable at runtime for config updates.

use crate::models::Tier;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Chat,
    QuickScan,
    DeepDive,
    PhotoAnalysis,
    Reports,
    UltraThink,
    ThinkHarder,
}

impl Endpoint {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::QuickScan => "quick_scan",
            Self::DeepDive => "deep_dive",
            Self::PhotoAnalysis => "photo_analysis",
            Self::Reports => "reports",
            Self::UltraThink => "ultra_think",
            Self::ThinkHarder => "think_harder",
        }
    }
}

/// Either a flat ordered list, or a chat-style pair with a distinct reasoning list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelCell {
    List(Vec<String>),
    ChatPair { models: Vec<String>, reasoning_models: Vec<String> },
}

impl ModelCell {
    fn resolve(&self, reasoning_mode: bool) -> &[String] {
        match self {
            Self::List(list) => list,
            Self::ChatPair { models, reasoning_models } => {
                if reasoning_mode { reasoning_models } else { models }
            }
        }
    }
}

type TierTable = HashMap<String, HashMap<String, ModelCell>>;

static DEFAULT_CONFIG: Lazy<TierTable> = Lazy::new(default_model_config);

pub struct ModelSelector {
    table: RwLock<TierTable>,
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self { table: RwLock::new(DEFAULT_CONFIG.clone()) }
    }
}

impl ModelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the table from a JSON file if `path` exists and parses; otherwise keeps
    /// compiled defaults. Mirrors the donor's re-invocable `Config::load()` posture.
    pub fn load(path: Option<&str>) -> Self {
        let selector = Self::new();
        if let Some(path) = path
            && std::path::Path::new(path).exists()
        {
            match std::fs::read_to_string(path).and_then(|s| {
                serde_json::from_str::<TierTable>(&s).map_err(std::io::Error::other)
            }) {
                Ok(table) => *selector.table.write().expect("model selector lock poisoned") = table,
                Err(e) => tracing::warn!("failed to load model config from {path}: {e}"),
            }
        }
        selector
    }

    pub fn reload(&self, path: &str) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(path)?;
        let table: TierTable = serde_json::from_str(&content)?;
        *self.table.write().expect("model selector lock poisoned") = table;
        Ok(())
    }

    /// Falls back to the `free` cell when the requested tier has no entry.
    pub fn models(&self, tier: Tier, endpoint: Endpoint, reasoning_mode: bool) -> Vec<String> {
        let table = self.table.read().expect("model selector lock poisoned");
        let tier_cell = table.get(tier.as_str()).or_else(|| table.get("free"));
        let Some(tier_cell) = tier_cell else { return Vec::new() };
        tier_cell
            .get(endpoint.as_str())
            .map(|cell| cell.resolve(reasoning_mode).to_vec())
            .unwrap_or_default()
    }

    /// Saturating index: returns the requested model, or the last one if out of range.
    pub fn select(
        &self,
        tier: Tier,
        endpoint: Endpoint,
        reasoning_mode: bool,
        preferred_index: usize,
    ) -> Option<String> {
        let models = self.models(tier, endpoint, reasoning_mode);
        if models.is_empty() {
            return None;
        }
        let idx = preferred_index.min(models.len() - 1);
        Some(models[idx].clone())
    }
}

fn default_model_config() -> TierTable {
    let mut table = TierTable::new();

    let free = [
        ("chat", ModelCell::ChatPair {
            models: vec!["deepseek/deepseek-chat".into(), "google/gemini-2.0-flash-exp:free".into()],
            reasoning_models: vec!["deepseek/deepseek-r1".into(), "google/gemini-2.5-flash".into()],
        }),
        ("quick_scan", ModelCell::List(vec!["deepseek/deepseek-chat".into(), "google/gemini-2.0-flash-exp:free".into()])),
        ("deep_dive", ModelCell::List(vec!["deepseek/deepseek-r1".into(), "google/gemini-2.5-flash".into()])),
        ("photo_analysis", ModelCell::List(vec!["openai/gpt-5".into(), "google/gemini-2.5-pro".into()])),
        ("reports", ModelCell::List(vec!["openai/gpt-5".into(), "google/gemini-2.5-pro".into()])),
        ("ultra_think", ModelCell::List(vec!["x-ai/grok-4".into(), "google/gemini-2.5-pro".into()])),
        ("think_harder", ModelCell::List(vec!["deepseek/deepseek-r1".into(), "google/gemini-2.5-flash".into()])),
    ];

    let basic = [
        ("chat", ModelCell::ChatPair {
            models: vec!["google/gemini-2.5-flash".into(), "openai/gpt-5".into()],
            reasoning_models: vec!["openai/gpt-5".into(), "google/gemini-2.5-pro".into()],
        }),
        ("quick_scan", ModelCell::List(vec!["openai/gpt-5-mini".into(), "google/gemini-2.5-flash".into()])),
        ("deep_dive", ModelCell::List(vec!["openai/gpt-5".into(), "google/gemini-2.5-pro".into()])),
        ("photo_analysis", ModelCell::List(vec!["openai/gpt-5".into(), "google/gemini-2.5-pro".into()])),
        ("reports", ModelCell::List(vec!["openai/gpt-5".into(), "google/gemini-2.5-pro".into()])),
        ("ultra_think", ModelCell::List(vec!["x-ai/grok-4".into(), "google/gemini-2.5-pro".into()])),
        ("think_harder", ModelCell::List(vec!["openai/gpt-5-mini".into(), "google/gemini-2.5-pro".into()])),
    ];

    let pro_like = [
        ("chat", ModelCell::ChatPair {
            models: vec!["anthropic/claude-4-sonnet".into(), "openai/gpt-5".into()],
            reasoning_models: vec!["openai/gpt-5".into(), "google/gemini-2.5-pro".into()],
        }),
        ("quick_scan", ModelCell::List(vec!["openai/gpt-5-mini".into(), "google/gemini-2.5-flash".into()])),
        ("deep_dive", ModelCell::List(vec!["openai/gpt-5".into(), "google/gemini-2.5-pro".into()])),
        ("photo_analysis", ModelCell::List(vec!["openai/gpt-5".into(), "google/gemini-2.5-pro".into()])),
        ("reports", ModelCell::List(vec!["openai/gpt-5".into(), "google/gemini-2.5-pro".into()])),
        ("ultra_think", ModelCell::List(vec!["x-ai/grok-4".into(), "google/gemini-2.5-pro".into()])),
        ("think_harder", ModelCell::List(vec!["openai/gpt-5-mini".into(), "google/gemini-2.5-pro".into()])),
    ];

    table.insert("free".into(), free.into_iter().map(|(k, v)| (k.to_string(), v)).collect());
    table.insert("basic".into(), basic.into_iter().map(|(k, v)| (k.to_string(), v)).collect());
    table.insert("pro".into(), pro_like.clone().into_iter().map(|(k, v)| (k.to_string(), v)).collect());
    table.insert("pro_plus".into(), pro_like.into_iter().map(|(k, v)| (k.to_string(), v)).collect());

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tier_falls_back_to_free() {
        let selector = ModelSelector::new();
        let models = selector.models(Tier::Max, Endpoint::Chat, false);
        assert!(!models.is_empty());
    }

    #[test]
    fn chat_reasoning_mode_selects_reasoning_list() {
        let selector = ModelSelector::new();
        let normal = selector.models(Tier::Free, Endpoint::Chat, false);
        let reasoning = selector.models(Tier::Free, Endpoint::Chat, true);
        assert_ne!(normal, reasoning);
    }

    #[test]
    fn select_saturates_at_last_index() {
        let selector = ModelSelector::new();
        let model = selector.select(Tier::Free, Endpoint::QuickScan, false, 50);
        let models = selector.models(Tier::Free, Endpoint::QuickScan, false);
        assert_eq!(model.as_deref(), models.last().map(|s| s.as_str()));
    }

    #[test]
    fn select_is_pure() {
        let selector = ModelSelector::new();
        let a = selector.select(Tier::Pro, Endpoint::DeepDive, false, 0);
        let b = selector.select(Tier::Pro, Endpoint::DeepDive, false, 0);
        assert_eq!(a, b);
    }
}
