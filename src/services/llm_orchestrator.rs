//! Model-family-aware request shaping and per-model fallback (§4.6).
//!
//! Generalizes the donor's single-scenario `LLMClient::chat_completion` into a
//! dispatcher covering every reasoning-capable model family this system talks to.

use crate::models::Tier;
use crate::services::http_client::{with_retry, HttpClient, HttpError};
use crate::services::json_extractor;
use crate::services::model_selector::{Endpoint, ModelSelector};
use crate::services::token_counter;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("all configured models failed for this request")]
    AllModelsFailed,
    #[error("no models configured for this tier/endpoint")]
    NoModelsConfigured,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub reasoning_tokens: Option<u64>,
    pub response_tokens: Option<u64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CallResult {
    pub content: String,
    pub parsed_content: Option<Value>,
    pub reasoning: Option<String>,
    pub has_reasoning: bool,
    pub usage: Usage,
    pub model: String,
    pub finish_reason: Option<String>,
}

pub struct LlmOrchestrator {
    http: HttpClient,
    model_selector: ModelSelector,
    router_url: String,
    openrouter_api_key: Option<String>,
    openai_api_key: Option<String>,
    anthropic_api_key: Option<String>,
}

impl LlmOrchestrator {
    pub fn new(
        model_selector: ModelSelector,
        openrouter_api_key: Option<String>,
        openai_api_key: Option<String>,
        anthropic_api_key: Option<String>,
    ) -> Self {
        Self {
            http: HttpClient::new(),
            model_selector,
            router_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            openrouter_api_key,
            openai_api_key,
            anthropic_api_key,
        }
    }

    pub fn model_selector(&self) -> &ModelSelector {
        &self.model_selector
    }

    /// Single-model call. Raises on transport failure or non-2xx; `call_with_fallback`
    /// is the caller that catches this and advances to the next model.
    #[allow(clippy::too_many_arguments)]
    pub async fn call(
        &self,
        messages: &[Value],
        model: &str,
        endpoint: Option<Endpoint>,
        reasoning_mode: bool,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<CallResult, LlmError> {
        let body = build_request_body(messages, model, endpoint, reasoning_mode, temperature, max_tokens);
        let headers = self.headers_for(model);
        let header_refs: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        let response = with_retry(3, Duration::from_secs(1), || {
            self.http.post_json(&self.router_url, &header_refs, &body)
        })
        .await?;

        Ok(parse_response(response, model))
    }

    /// Resolves tier -> ordered model list, then calls each until one produces a
    /// non-empty `choices[0].message`. Pure w.r.t. side effects besides outbound HTTP.
    #[allow(clippy::too_many_arguments)]
    pub async fn call_with_fallback(
        &self,
        messages: &[Value],
        tier: Tier,
        endpoint: Endpoint,
        reasoning_mode: bool,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<CallResult, LlmError> {
        let models = self.model_selector.models(tier, endpoint, reasoning_mode);
        if models.is_empty() {
            return Err(LlmError::NoModelsConfigured);
        }

        for model in &models {
            match self.call(messages, model, Some(endpoint), reasoning_mode, temperature, max_tokens).await {
                Ok(result) if !result.content.is_empty() => return Ok(result),
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "model call failed, trying next in fallback chain");
                    continue;
                }
            }
        }

        Err(LlmError::AllModelsFailed)
    }

    fn headers_for(&self, model: &str) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];

        let byok = if is_openai_family(model) {
            self.openai_api_key.as_ref()
        } else if is_claude_family(model) {
            self.anthropic_api_key.as_ref()
        } else {
            None
        };

        if let Some(key) = byok.or(self.openrouter_api_key.as_ref()) {
            headers.push(("Authorization".to_string(), format!("Bearer {key}")));
        }

        headers
    }
}

fn is_openai_family(model: &str) -> bool {
    model.starts_with("openai/")
}

fn is_claude_family(model: &str) -> bool {
    model.starts_with("anthropic/")
}

fn is_o1_or_gpt5_family(model: &str) -> bool {
    model.contains("o1") || model.contains("gpt-5")
}

fn is_deepseek_r1_family(model: &str) -> bool {
    model.contains("deepseek-r1")
}

fn is_grok_family(model: &str) -> bool {
    model.contains("grok")
}

const REASONING_ENDPOINTS: &[Endpoint] =
    &[Endpoint::DeepDive, Endpoint::Reports, Endpoint::UltraThink];

fn build_request_body(
    messages: &[Value],
    model: &str,
    endpoint: Option<Endpoint>,
    reasoning_mode: bool,
    temperature: f64,
    max_tokens: u32,
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages,
    });

    let wants_reasoning = reasoning_mode
        || endpoint.map(|e| REASONING_ENDPOINTS.contains(&e)).unwrap_or(false);

    if !wants_reasoning {
        body["max_tokens"] = json!(max_tokens);
        body["temperature"] = json!(temperature);
        return body;
    }

    if is_o1_or_gpt5_family(model) {
        body["max_completion_tokens"] = json!(8000);
    } else if is_deepseek_r1_family(model) {
        body["reasoning"] = json!({"effort": "high"});
        body["max_tokens"] = json!(8000);
    } else if is_claude_family(model) {
        body["reasoning"] = json!({"max_tokens": 4000});
        body["max_tokens"] = json!(6000);
    } else if is_grok_family(model) {
        body["reasoning"] = json!({"effort": "high"});
        body["max_tokens"] = json!(12000);
        body["temperature"] = json!(0.3);
    } else {
        body["reasoning"] = json!({"effort": "medium"});
        body["max_tokens"] = json!(6000);
        body["temperature"] = json!(0.3);
    }

    body
}

fn parse_response(response: Value, model: &str) -> CallResult {
    let message = &response["choices"][0]["message"];
    let content = message["content"].as_str().unwrap_or_default().to_string();
    let finish_reason = response["choices"][0]["finish_reason"].as_str().map(|s| s.to_string());

    let reasoning = message["reasoning"]
        .as_str()
        .filter(|s| !s.is_empty())
        .or_else(|| message["reasoning_details"][0]["text"].as_str())
        .map(|s| s.to_string());

    let reported_reasoning_tokens =
        response["usage"]["completion_tokens_details"]["reasoning_tokens"].as_u64();
    let computed_reasoning_tokens = reasoning.as_ref().map(|r| token_counter::count(r) as u64);
    let reasoning_tokens = match (computed_reasoning_tokens, reported_reasoning_tokens) {
        (Some(computed), Some(reported)) if reported > computed => Some(reported),
        (Some(computed), _) => Some(computed),
        (None, reported) => reported,
    };

    let parsed_content = if content.is_empty() { None } else { json_extractor::extract(&content) };

    CallResult {
        usage: Usage {
            prompt_tokens: response["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            completion_tokens: response["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            reasoning_tokens,
            response_tokens: response["usage"]["completion_tokens_details"]["response_tokens"].as_u64(),
        },
        has_reasoning: reasoning.is_some(),
        reasoning,
        parsed_content,
        content,
        model: model.to_string(),
        finish_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpt5_family_uses_max_completion_tokens() {
        let body = build_request_body(&[], "openai/gpt-5", None, true, 0.7, 2000);
        assert_eq!(body["max_completion_tokens"], 8000);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn deepseek_r1_family_sets_high_effort_reasoning() {
        let body = build_request_body(&[], "deepseek/deepseek-r1", None, true, 0.7, 2000);
        assert_eq!(body["reasoning"]["effort"], "high");
        assert_eq!(body["max_tokens"], 8000);
    }

    #[test]
    fn claude_family_outer_max_tokens_exceeds_reasoning_budget() {
        let body = build_request_body(&[], "anthropic/claude-4-sonnet", None, true, 0.7, 2000);
        let reasoning_budget = body["reasoning"]["max_tokens"].as_u64().unwrap();
        let outer = body["max_tokens"].as_u64().unwrap();
        assert!(outer > reasoning_budget);
    }

    #[test]
    fn grok_family_sets_temperature_and_budget() {
        let body = build_request_body(&[], "x-ai/grok-4", None, true, 0.7, 2000);
        assert_eq!(body["max_tokens"], 12000);
        assert_eq!(body["temperature"], 0.3);
    }

    #[test]
    fn deep_dive_endpoint_implies_reasoning_even_without_flag() {
        let body = build_request_body(&[], "google/gemini-2.5-pro", Some(Endpoint::DeepDive), false, 0.7, 2000);
        assert_eq!(body["reasoning"]["effort"], "medium");
    }

    #[test]
    fn non_reasoning_call_passes_caller_max_tokens_unchanged() {
        let body = build_request_body(&[], "google/gemini-2.5-flash", Some(Endpoint::Chat), false, 0.5, 3000);
        assert_eq!(body["max_tokens"], 3000);
        assert_eq!(body["temperature"], 0.5);
    }

    #[test]
    fn parses_reasoning_and_parsed_content_from_response() {
        let response = json!({
            "choices": [{
                "message": {"content": "{\"question\": \"how long?\"}", "reasoning": "thinking..."},
                "finish_reason": "stop",
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 20},
        });
        let result = parse_response(response, "openai/gpt-5");
        assert!(result.has_reasoning);
        assert_eq!(result.parsed_content.unwrap()["question"], "how long?");
    }
}
